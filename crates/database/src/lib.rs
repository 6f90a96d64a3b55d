pub mod byte_array;
pub mod commitments;
pub mod fills;
pub mod numeric;
pub mod order_events;
pub mod orders;

use sqlx::Executor;

// Design:
//
// This crate speaks plain database types (BigDecimal, bytea wrappers, jsonb
// values) and deliberately does not depend on the domain model. The relayer's
// storage layer owns every conversion between the two, which keeps schema
// changes and model changes from rippling into each other.
//
// Functions that execute multiple queries take `&mut PgTransaction` to ensure
// the whole function succeeds or fails together. Functions that execute a
// single query take `&mut PgConnection`. We call the parameter `ex` for
// `Executor` which is the trait whose methods run queries. PgTransaction
// implements Deref to PgConnection so callers can use either kind of function
// inside a bigger transaction; they need to take care of calling `commit`.
//
// For tests a useful pattern is to start a transaction at the beginning of
// the test, use it for all queries and never commit it. When the uncommitted
// transaction gets dropped it is rolled back. This allows postgres tests to
// run in parallel and makes clearing all tables at the beginning of a test
// obsolete.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// A 32 byte digest stored as `bytea`, used for order hashes, hashlocks and
/// escrow identifiers alike.
pub type OrderHash = byte_array::ByteArray<32>;

/// The names of all tables this crate touches.
pub const TABLES: &[&str] = &["orders", "fills", "commitments", "order_events"];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER_(ex: &mut PgTransaction<'_>) -> sqlx::Result<()> {
    for table in TABLES {
        ex.execute(format!("TRUNCATE {table};").as_str()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;
    use sqlx::PgConnection;

    #[tokio::test]
    #[ignore]
    async fn postgres_clear() {
        let mut con = PgConnection::connect("postgresql://").await.unwrap();
        let mut con = con.begin().await.unwrap();
        clear_DANGER_(&mut con).await.unwrap();
    }
}
