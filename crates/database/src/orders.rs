use crate::OrderHash;
use crate::byte_array::ByteArray;
use sqlx::PgConnection;
use sqlx::types::BigDecimal;
use sqlx::types::JsonValue;
use sqlx::types::chrono::DateTime;
use sqlx::types::chrono::Utc;

/// Lifecycle states of an order as stored in the database.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "OrderStatus", rename_all = "camelCase")]
pub enum OrderStatus {
    #[default]
    Broadcasted,
    Committed,
    EscrowsReady,
    UserFundsTransferred,
    Completed,
    RescueAvailable,
    Expired,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "SigningScheme", rename_all = "lowercase")]
pub enum SigningScheme {
    #[default]
    Eip712,
    EthSign,
}

/// One row in the `orders` table.
///
/// Addresses are stored as the jsonb form of the chain-tagged address so the
/// schema does not care which chain family an order touches. Amounts and other
/// 256 bit words are `numeric`.
#[derive(Clone, Debug, Default, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub order_hash: OrderHash,
    pub creation_timestamp: DateTime<Utc>,
    pub salt: BigDecimal,
    pub maker: JsonValue,
    pub receiver: JsonValue,
    pub maker_asset: JsonValue,
    pub taker_asset: JsonValue,
    pub making_amount: BigDecimal,
    pub taking_amount: BigDecimal,
    pub deadline: i64,
    pub nonce: BigDecimal,
    pub src_chain_id: i64,
    pub dst_chain_id: i64,
    pub auction_start_time: i64,
    pub auction_end_time: i64,
    pub start_price: BigDecimal,
    pub end_price: BigDecimal,
    pub signing_scheme: SigningScheme,
    pub signature: Vec<u8>,
    pub hashlock: ByteArray<32>,
    pub secret: ByteArray<32>,
    pub status: OrderStatus,
    pub secret_revealed_at: Option<DateTime<Utc>>,
}

pub async fn insert(ex: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO orders (
    order_hash,
    creation_timestamp,
    salt,
    maker,
    receiver,
    maker_asset,
    taker_asset,
    making_amount,
    taking_amount,
    deadline,
    nonce,
    src_chain_id,
    dst_chain_id,
    auction_start_time,
    auction_end_time,
    start_price,
    end_price,
    signing_scheme,
    signature,
    hashlock,
    secret,
    status,
    secret_revealed_at
)
VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
    $17, $18, $19, $20, $21, $22, $23
)
    ;"#;
    sqlx::query(QUERY)
        .bind(order.order_hash)
        .bind(order.creation_timestamp)
        .bind(&order.salt)
        .bind(&order.maker)
        .bind(&order.receiver)
        .bind(&order.maker_asset)
        .bind(&order.taker_asset)
        .bind(&order.making_amount)
        .bind(&order.taking_amount)
        .bind(order.deadline)
        .bind(&order.nonce)
        .bind(order.src_chain_id)
        .bind(order.dst_chain_id)
        .bind(order.auction_start_time)
        .bind(order.auction_end_time)
        .bind(&order.start_price)
        .bind(&order.end_price)
        .bind(order.signing_scheme)
        .bind(&order.signature)
        .bind(order.hashlock)
        .bind(order.secret)
        .bind(order.status)
        .bind(order.secret_revealed_at)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn single_order(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
) -> Result<Option<Order>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM orders
WHERE order_hash = $1
    ;"#;
    sqlx::query_as(QUERY).bind(order_hash).fetch_optional(ex).await
}

pub async fn set_status(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    status: OrderStatus,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE orders
SET status = $2
WHERE order_hash = $1
    ;"#;
    sqlx::query(QUERY)
        .bind(order_hash)
        .bind(status)
        .execute(ex)
        .await
        .map(|_| ())
}

/// Records when the secret became public. Only the first call per order has
/// an effect; returns whether this call was the first.
pub async fn set_secret_revealed_at(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE orders
SET secret_revealed_at = $2
WHERE order_hash = $1 AND secret_revealed_at IS NULL
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(order_hash)
        .bind(at)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// All orders that can still accept resolver commitments and have not passed
/// their deadline.
pub async fn active_orders(
    ex: &mut PgConnection,
    now_timestamp: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM orders
WHERE status IN ('broadcasted', 'committed', 'rescueAvailable')
  AND deadline > $1
ORDER BY creation_timestamp
    ;"#;
    sqlx::query_as(QUERY).bind(now_timestamp).fetch_all(ex).await
}

/// Orders whose deadline has passed but whose status does not reflect that
/// yet. Terminal and in-settlement orders are excluded; once user funds moved
/// the swap finishes through the secret path regardless of the deadline.
pub async fn overdue_orders(
    ex: &mut PgConnection,
    now_timestamp: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM orders
WHERE status IN ('broadcasted', 'committed', 'rescueAvailable')
  AND deadline <= $1
    ;"#;
    sqlx::query_as(QUERY).bind(now_timestamp).fetch_all(ex).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    fn order_with_hash(hash: [u8; 32]) -> Order {
        Order {
            order_hash: ByteArray(hash),
            salt: BigDecimal::from(42),
            maker: serde_json::json!({"evm": "0x000000000000000000000000000000000000beef"}),
            making_amount: BigDecimal::from(100),
            taking_amount: BigDecimal::from(99),
            deadline: 2_000,
            src_chain_id: 1,
            dst_chain_id: 137,
            auction_start_time: 1_000,
            auction_end_time: 1_300,
            start_price: BigDecimal::from(102),
            end_price: BigDecimal::from(98),
            signature: vec![1u8; 65],
            hashlock: ByteArray([7; 32]),
            secret: ByteArray([8; 32]),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_roundtrip() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let order = order_with_hash([1; 32]);
        insert(&mut db, &order).await.unwrap();

        let mut read = single_order(&mut db, &order.order_hash)
            .await
            .unwrap()
            .unwrap();
        // Postgres keeps micros only while DateTime has nanos.
        read.creation_timestamp = order.creation_timestamp;
        assert_eq!(read, order);

        // Duplicate hash violates the primary key.
        assert!(insert(&mut db, &order).await.is_err());

        let missing = single_order(&mut db, &ByteArray([9; 32])).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_status_and_reveal() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let order = order_with_hash([1; 32]);
        insert(&mut db, &order).await.unwrap();

        set_status(&mut db, &order.order_hash, OrderStatus::Committed)
            .await
            .unwrap();
        let read = single_order(&mut db, &order.order_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.status, OrderStatus::Committed);

        // Only the first reveal wins.
        let now = Utc::now();
        assert!(
            set_secret_revealed_at(&mut db, &order.order_hash, now)
                .await
                .unwrap()
        );
        assert!(
            !set_secret_revealed_at(&mut db, &order.order_hash, now)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_active_orders() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let open = order_with_hash([1; 32]);
        let done = Order {
            status: OrderStatus::Completed,
            ..order_with_hash([2; 32])
        };
        let overdue = Order {
            deadline: 500,
            ..order_with_hash([3; 32])
        };
        for order in [&open, &done, &overdue] {
            insert(&mut db, order).await.unwrap();
        }

        let active = active_orders(&mut db, 1_000).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].order_hash, open.order_hash);

        let late = overdue_orders(&mut db, 1_000).await.unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].order_hash, overdue.order_hash);
    }
}
