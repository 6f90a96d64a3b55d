//! Stores timestamped events of every order throughout its lifecycle so the
//! API can expose a settlement timeline per order.

use crate::OrderHash;
use sqlx::PgConnection;
use sqlx::types::chrono::DateTime;
use sqlx::types::chrono::Utc;

/// Describes what kind of event was registered for an order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "OrderEventLabel", rename_all = "camelCase")]
pub enum OrderEventLabel {
    /// Order was validated and added to the book.
    Created,
    /// A resolver committed to fill some part of the order.
    Committed,
    /// Both escrows were verified for a commitment.
    EscrowsReady,
    /// User principal was locked into the source escrow.
    UserFundsTransferred,
    /// The secret became public on the destination chain.
    SecretRevealed,
    /// The swap settled.
    Completed,
    /// A resolver missed its commitment deadline and lost its deposit.
    Slashed,
    /// The order passed its deadline without settling.
    Expired,
}

/// Contains a single event of the life cycle of an order and when it was
/// registered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct OrderEvent {
    pub order_hash: OrderHash,
    pub timestamp: DateTime<Utc>,
    pub label: OrderEventLabel,
}

pub async fn insert_order_event(
    ex: &mut PgConnection,
    event: &OrderEvent,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO order_events (order_hash, timestamp, label)
VALUES ($1, $2, $3)
    ;"#;
    sqlx::query(QUERY)
        .bind(event.order_hash)
        .bind(event.timestamp)
        .bind(event.label)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn events_of(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
) -> Result<Vec<OrderEvent>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM order_events
WHERE order_hash = $1
ORDER BY timestamp
    ;"#;
    sqlx::query_as(QUERY).bind(order_hash).fetch_all(ex).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_array::ByteArray;
    use sqlx::Connection;

    #[tokio::test]
    #[ignore]
    async fn postgres_order_events() {
        let mut db = sqlx::PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let hash_a = ByteArray([1; 32]);
        let hash_b = ByteArray([2; 32]);
        let start = Utc::now();
        let labels = [
            OrderEventLabel::Created,
            OrderEventLabel::Committed,
            OrderEventLabel::Completed,
        ];
        for (i, label) in labels.into_iter().enumerate() {
            let event = OrderEvent {
                order_hash: hash_a,
                timestamp: start + chrono::Duration::seconds(i as i64),
                label,
            };
            insert_order_event(&mut db, &event).await.unwrap();
        }
        insert_order_event(
            &mut db,
            &OrderEvent {
                order_hash: hash_b,
                timestamp: start,
                label: OrderEventLabel::Created,
            },
        )
        .await
        .unwrap();

        let events = events_of(&mut db, &hash_a).await.unwrap();
        assert_eq!(
            events.iter().map(|event| event.label).collect::<Vec<_>>(),
            labels
        );
        assert!(events.iter().all(|event| event.order_hash == hash_a));
    }
}
