use crate::OrderHash;
use sqlx::PgConnection;
use sqlx::types::BigDecimal;

/// Fill accounting for one order. `filled_amount` counts reserved capacity,
/// including live commitments that have not settled yet.
#[derive(Clone, Debug, Default, PartialEq, sqlx::FromRow)]
pub struct Fill {
    pub order_hash: OrderHash,
    pub total_amount: BigDecimal,
    pub filled_amount: BigDecimal,
}

pub async fn insert(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    total_amount: &BigDecimal,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO fills (order_hash, total_amount, filled_amount)
VALUES ($1, $2, 0)
    ;"#;
    sqlx::query(QUERY)
        .bind(order_hash)
        .bind(total_amount)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn fill(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
) -> Result<Option<Fill>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT *
FROM fills
WHERE order_hash = $1
    ;"#;
    sqlx::query_as(QUERY).bind(order_hash).fetch_optional(ex).await
}

/// Reserves part of the order's capacity for a commitment. The update is
/// guarded so concurrent reservations can never exceed `total_amount`;
/// returns whether the reservation succeeded. Taking the row lock here also
/// serializes concurrent commit transactions on the same order.
pub async fn reserve(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    amount: &BigDecimal,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE fills
SET filled_amount = filled_amount + $2
WHERE order_hash = $1
  AND filled_amount + $2 <= total_amount
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(order_hash)
        .bind(amount)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Returns reserved capacity to the order, used when a commitment is slashed.
pub async fn release(
    ex: &mut PgConnection,
    order_hash: &OrderHash,
    amount: &BigDecimal,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE fills
SET filled_amount = GREATEST(filled_amount - $2, 0)
WHERE order_hash = $1
    ;"#;
    sqlx::query(QUERY)
        .bind(order_hash)
        .bind(amount)
        .execute(ex)
        .await
        .map(|_| ())
}
