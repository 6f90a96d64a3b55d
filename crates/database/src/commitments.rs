use crate::OrderHash;
use crate::byte_array::ByteArray;
use sqlx::PgConnection;
use sqlx::types::BigDecimal;
use sqlx::types::JsonValue;
use sqlx::types::chrono::DateTime;
use sqlx::types::chrono::Utc;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "CommitmentState", rename_all = "camelCase")]
pub enum CommitmentState {
    #[default]
    Pending,
    EscrowsReady,
    Completed,
    Slashable,
}

/// One row in the `commitments` table. A new row is appended for every
/// accepted commitment; slashed rows stay behind as history, so an order can
/// accumulate several rows for the same resolver across rescue rounds.
#[derive(Clone, Debug, Default, PartialEq, sqlx::FromRow)]
pub struct Commitment {
    pub id: i64,
    pub order_hash: OrderHash,
    pub resolver: JsonValue,
    pub partial_amount: BigDecimal,
    pub accepted_price: BigDecimal,
    pub safety_deposit: BigDecimal,
    pub deadline: DateTime<Utc>,
    pub state: CommitmentState,
    pub src_escrow: Option<ByteArray<32>>,
    pub dst_escrow: Option<ByteArray<32>>,
}

/// Inserts a commitment; the generated row id is returned.
pub async fn insert(ex: &mut PgConnection, commitment: &Commitment) -> Result<i64, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO commitments (
    order_hash,
    resolver,
    partial_amount,
    accepted_price,
    safety_deposit,
    deadline,
    state,
    src_escrow,
    dst_escrow
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
RETURNING id
    ;"#;
    let (id,): (i64,) = sqlx::query_as(QUERY)
        .bind(commitment.order_hash)
        .bind(&commitment.resolver)
        .bind(&commitment.partial_amount)
        .bind(&commitment.accepted_price)
        .bind(&commitment.safety_deposit)
        .bind(commitment.deadline)
        .bind(commitment.state)
        .bind(commitment.src_escrow)
        .bind(commitment.dst_escrow)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

/// The pending or escrows-ready commitment of this resolver on this order,
/// if one exists. At most one can be live at a time because commits for the
/// same order are serialized through the fills row lock.
pub async fn live_commitment(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    resolver: &JsonValue,
) -> Result<Option<Commitment>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM commitments
WHERE order_hash = $1
  AND resolver = $2
  AND state IN ('pending', 'escrowsReady')
    ;"#;
    sqlx::query_as(QUERY)
        .bind(order_hash)
        .bind(resolver)
        .fetch_optional(ex)
        .await
}

pub async fn commitments_for_order(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
) -> Result<Vec<Commitment>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM commitments
WHERE order_hash = $1
ORDER BY id
    ;"#;
    sqlx::query_as(QUERY).bind(order_hash).fetch_all(ex).await
}

/// Moves this resolver's live commitment to a new state; returns whether a
/// live commitment existed.
pub async fn update_live_state(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    resolver: &JsonValue,
    state: CommitmentState,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE commitments
SET state = $3
WHERE order_hash = $1
  AND resolver = $2
  AND state IN ('pending', 'escrowsReady')
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(order_hash)
        .bind(resolver)
        .bind(state)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Records the verified escrow pair and moves the commitment from pending to
/// escrows-ready; returns whether a pending commitment existed.
pub async fn set_escrows(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    resolver: &JsonValue,
    src_escrow: ByteArray<32>,
    dst_escrow: ByteArray<32>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE commitments
SET state = 'escrowsReady', src_escrow = $3, dst_escrow = $4
WHERE order_hash = $1
  AND resolver = $2
  AND state = 'pending'
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(order_hash)
        .bind(resolver)
        .bind(src_escrow)
        .bind(dst_escrow)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Marks every pending commitment whose deadline has passed as slashable and
/// returns the affected rows.
pub async fn slash_overdue(
    ex: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Commitment>, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE commitments
SET state = 'slashable'
WHERE state = 'pending'
  AND deadline <= $1
RETURNING *
    ;"#;
    sqlx::query_as(QUERY).bind(now).fetch_all(ex).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    fn commitment(hash: [u8; 32], resolver: u8) -> Commitment {
        Commitment {
            order_hash: ByteArray(hash),
            resolver: serde_json::json!({ "evm": format!("0x{}", hex::encode([resolver; 20])) }),
            partial_amount: BigDecimal::from(60),
            accepted_price: BigDecimal::from(101),
            safety_deposit: BigDecimal::from(1),
            deadline: DateTime::UNIX_EPOCH + chrono::Duration::seconds(300),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_roundtrip() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let mut first = commitment([1; 32], 0xaa);
        first.id = insert(&mut db, &first).await.unwrap();
        let mut second = commitment([1; 32], 0xbb);
        second.id = insert(&mut db, &second).await.unwrap();

        let all = commitments_for_order(&mut db, &first.order_hash).await.unwrap();
        assert_eq!(all, vec![first.clone(), second]);

        let live = live_commitment(&mut db, &first.order_hash, &first.resolver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live, first);
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_state_transitions() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let pending = commitment([1; 32], 0xaa);
        insert(&mut db, &pending).await.unwrap();

        assert!(
            set_escrows(
                &mut db,
                &pending.order_hash,
                &pending.resolver,
                ByteArray([2; 32]),
                ByteArray([3; 32]),
            )
            .await
            .unwrap()
        );
        // Already past pending, so a second attempt finds nothing.
        assert!(
            !set_escrows(
                &mut db,
                &pending.order_hash,
                &pending.resolver,
                ByteArray([2; 32]),
                ByteArray([3; 32]),
            )
            .await
            .unwrap()
        );

        let live = live_commitment(&mut db, &pending.order_hash, &pending.resolver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.state, CommitmentState::EscrowsReady);
        assert_eq!(live.src_escrow, Some(ByteArray([2; 32])));
        assert_eq!(live.dst_escrow, Some(ByteArray([3; 32])));

        assert!(
            update_live_state(
                &mut db,
                &pending.order_hash,
                &pending.resolver,
                CommitmentState::Completed,
            )
            .await
            .unwrap()
        );
        let gone = live_commitment(&mut db, &pending.order_hash, &pending.resolver)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_slash_overdue() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let overdue = commitment([1; 32], 0xaa);
        insert(&mut db, &overdue).await.unwrap();
        let settling = Commitment {
            state: CommitmentState::EscrowsReady,
            ..commitment([2; 32], 0xbb)
        };
        insert(&mut db, &settling).await.unwrap();

        let now = DateTime::UNIX_EPOCH + chrono::Duration::seconds(600);
        let slashed = slash_overdue(&mut db, now).await.unwrap();
        assert_eq!(slashed.len(), 1);
        assert_eq!(slashed[0].order_hash, overdue.order_hash);
        assert_eq!(slashed[0].state, CommitmentState::Slashable);

        // Escrows-ready commitments ride out their deadline.
        let live = live_commitment(&mut db, &settling.order_hash, &settling.resolver)
            .await
            .unwrap();
        assert!(live.is_some());

        // Nothing left to slash on the second sweep.
        assert!(slash_overdue(&mut db, now).await.unwrap().is_empty());
    }
}
