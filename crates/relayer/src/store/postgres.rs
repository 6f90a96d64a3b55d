//! Storage backed by Postgres through the database crate.
//!
//! Every trait method manages its own connection or transaction. `commit`
//! relies on the guarded update of the fills row to serialize concurrent
//! commitments on the same order; see `database::fills::reserve`.

use super::{EventLabel, FillState, OrderEvent, Storage, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database::byte_array::ByteArray;
use database::numeric::{big_decimal_to_u256, u256_to_big_decimal};
use model::{
    chain::ChainAddress,
    commitment::{Commitment, CommitmentState},
    escrow::EscrowId,
    order::{Order, OrderData, OrderHash, OrderMetadata, OrderStatus},
    secret::Secret,
    signature::{EcdsaSignature, EcdsaSigningScheme, Signature},
};
use primitive_types::{H256, U256};
use sqlx::types::{BigDecimal, JsonValue};
use sqlx::PgPool;

// The pool uses an Arc internally.
#[derive(Clone)]
pub struct Postgres {
    pub pool: PgPool,
}

impl Postgres {
    pub fn new(uri: &str) -> Result<Self> {
        Ok(Self {
            pool: PgPool::connect_lazy(uri)?,
        })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.into())
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Timing of db queries.
    #[metric(name = "relayer_database_queries", labels("type"))]
    database_queries: prometheus::HistogramVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

fn address_to_db(address: &ChainAddress) -> Result<JsonValue, StoreError> {
    Ok(serde_json::to_value(address).context("serialize chain address")?)
}

fn address_from_db(value: JsonValue) -> Result<ChainAddress, StoreError> {
    Ok(serde_json::from_value(value).context("chain address stored in database")?)
}

fn u64_to_db(value: u64) -> Result<i64, StoreError> {
    Ok(i64::try_from(value).context("value does not fit the database integer")?)
}

fn u64_from_db(value: i64) -> Result<u64, StoreError> {
    Ok(u64::try_from(value).context("negative value stored in database")?)
}

fn u256_from_db(value: &BigDecimal) -> Result<U256, StoreError> {
    Ok(big_decimal_to_u256(value).context("number stored in database does not fit a U256")?)
}

fn status_to_db(status: OrderStatus) -> database::orders::OrderStatus {
    match status {
        OrderStatus::Broadcasted => database::orders::OrderStatus::Broadcasted,
        OrderStatus::Committed => database::orders::OrderStatus::Committed,
        OrderStatus::EscrowsReady => database::orders::OrderStatus::EscrowsReady,
        OrderStatus::UserFundsTransferred => database::orders::OrderStatus::UserFundsTransferred,
        OrderStatus::Completed => database::orders::OrderStatus::Completed,
        OrderStatus::RescueAvailable => database::orders::OrderStatus::RescueAvailable,
        OrderStatus::Expired => database::orders::OrderStatus::Expired,
    }
}

fn status_from_db(status: database::orders::OrderStatus) -> OrderStatus {
    match status {
        database::orders::OrderStatus::Broadcasted => OrderStatus::Broadcasted,
        database::orders::OrderStatus::Committed => OrderStatus::Committed,
        database::orders::OrderStatus::EscrowsReady => OrderStatus::EscrowsReady,
        database::orders::OrderStatus::UserFundsTransferred => OrderStatus::UserFundsTransferred,
        database::orders::OrderStatus::Completed => OrderStatus::Completed,
        database::orders::OrderStatus::RescueAvailable => OrderStatus::RescueAvailable,
        database::orders::OrderStatus::Expired => OrderStatus::Expired,
    }
}

fn state_to_db(state: CommitmentState) -> database::commitments::CommitmentState {
    match state {
        CommitmentState::Pending => database::commitments::CommitmentState::Pending,
        CommitmentState::EscrowsReady => database::commitments::CommitmentState::EscrowsReady,
        CommitmentState::Completed => database::commitments::CommitmentState::Completed,
        CommitmentState::Slashable => database::commitments::CommitmentState::Slashable,
    }
}

fn state_from_db(state: database::commitments::CommitmentState) -> CommitmentState {
    match state {
        database::commitments::CommitmentState::Pending => CommitmentState::Pending,
        database::commitments::CommitmentState::EscrowsReady => CommitmentState::EscrowsReady,
        database::commitments::CommitmentState::Completed => CommitmentState::Completed,
        database::commitments::CommitmentState::Slashable => CommitmentState::Slashable,
    }
}

fn label_to_db(label: EventLabel) -> database::order_events::OrderEventLabel {
    match label {
        EventLabel::Created => database::order_events::OrderEventLabel::Created,
        EventLabel::Committed => database::order_events::OrderEventLabel::Committed,
        EventLabel::EscrowsReady => database::order_events::OrderEventLabel::EscrowsReady,
        EventLabel::UserFundsTransferred => {
            database::order_events::OrderEventLabel::UserFundsTransferred
        }
        EventLabel::SecretRevealed => database::order_events::OrderEventLabel::SecretRevealed,
        EventLabel::Completed => database::order_events::OrderEventLabel::Completed,
        EventLabel::Slashed => database::order_events::OrderEventLabel::Slashed,
        EventLabel::Expired => database::order_events::OrderEventLabel::Expired,
    }
}

fn label_from_db(label: database::order_events::OrderEventLabel) -> EventLabel {
    match label {
        database::order_events::OrderEventLabel::Created => EventLabel::Created,
        database::order_events::OrderEventLabel::Committed => EventLabel::Committed,
        database::order_events::OrderEventLabel::EscrowsReady => EventLabel::EscrowsReady,
        database::order_events::OrderEventLabel::UserFundsTransferred => {
            EventLabel::UserFundsTransferred
        }
        database::order_events::OrderEventLabel::SecretRevealed => EventLabel::SecretRevealed,
        database::order_events::OrderEventLabel::Completed => EventLabel::Completed,
        database::order_events::OrderEventLabel::Slashed => EventLabel::Slashed,
        database::order_events::OrderEventLabel::Expired => EventLabel::Expired,
    }
}

fn order_to_db(order: &Order, secret: &Secret) -> Result<database::orders::Order, StoreError> {
    Ok(database::orders::Order {
        order_hash: ByteArray(order.metadata.order_hash.0),
        creation_timestamp: order.metadata.creation_date,
        salt: u256_to_big_decimal(&order.data.salt),
        maker: address_to_db(&order.data.maker)?,
        receiver: address_to_db(&order.data.receiver)?,
        maker_asset: address_to_db(&order.data.maker_asset)?,
        taker_asset: address_to_db(&order.data.taker_asset)?,
        making_amount: u256_to_big_decimal(&order.data.making_amount),
        taking_amount: u256_to_big_decimal(&order.data.taking_amount),
        deadline: u64_to_db(order.data.deadline)?,
        nonce: u256_to_big_decimal(&order.data.nonce),
        src_chain_id: u64_to_db(order.data.src_chain_id)?,
        dst_chain_id: u64_to_db(order.data.dst_chain_id)?,
        auction_start_time: u64_to_db(order.data.auction_start_time)?,
        auction_end_time: u64_to_db(order.data.auction_end_time)?,
        start_price: u256_to_big_decimal(&order.data.start_price),
        end_price: u256_to_big_decimal(&order.data.end_price),
        signing_scheme: match order.signature.scheme() {
            EcdsaSigningScheme::Eip712 => database::orders::SigningScheme::Eip712,
            EcdsaSigningScheme::EthSign => database::orders::SigningScheme::EthSign,
        },
        signature: order.signature.to_bytes().to_vec(),
        hashlock: ByteArray(order.metadata.hashlock.0),
        secret: ByteArray(secret.0 .0),
        status: status_to_db(order.metadata.status),
        secret_revealed_at: order.metadata.secret_revealed_at,
    })
}

fn order_from_db(row: database::orders::Order) -> Result<Order, StoreError> {
    let signature: [u8; 65] = row
        .signature
        .as_slice()
        .try_into()
        .ok()
        .context("signature stored in database has wrong length")?;
    let scheme = match row.signing_scheme {
        database::orders::SigningScheme::Eip712 => EcdsaSigningScheme::Eip712,
        database::orders::SigningScheme::EthSign => EcdsaSigningScheme::EthSign,
    };
    Ok(Order {
        metadata: OrderMetadata {
            order_hash: OrderHash(row.order_hash.0),
            status: status_from_db(row.status),
            creation_date: row.creation_timestamp,
            hashlock: H256(row.hashlock.0),
            // Folded in from the fills table by the caller.
            filled_amount: U256::zero(),
            secret_revealed_at: row.secret_revealed_at,
        },
        data: OrderData {
            salt: u256_from_db(&row.salt)?,
            maker: address_from_db(row.maker)?,
            receiver: address_from_db(row.receiver)?,
            maker_asset: address_from_db(row.maker_asset)?,
            taker_asset: address_from_db(row.taker_asset)?,
            making_amount: u256_from_db(&row.making_amount)?,
            taking_amount: u256_from_db(&row.taking_amount)?,
            deadline: u64_from_db(row.deadline)?,
            nonce: u256_from_db(&row.nonce)?,
            src_chain_id: u64_from_db(row.src_chain_id)?,
            dst_chain_id: u64_from_db(row.dst_chain_id)?,
            auction_start_time: u64_from_db(row.auction_start_time)?,
            auction_end_time: u64_from_db(row.auction_end_time)?,
            start_price: u256_from_db(&row.start_price)?,
            end_price: u256_from_db(&row.end_price)?,
        },
        signature: Signature::from_ecdsa(scheme, EcdsaSignature::from_bytes(&signature)),
    })
}

fn commitment_to_db(
    commitment: &Commitment,
) -> Result<database::commitments::Commitment, StoreError> {
    Ok(database::commitments::Commitment {
        // Assigned by the database on insert.
        id: 0,
        order_hash: ByteArray(commitment.order_hash.0),
        resolver: address_to_db(&commitment.resolver)?,
        partial_amount: u256_to_big_decimal(&commitment.partial_amount),
        accepted_price: u256_to_big_decimal(&commitment.accepted_price),
        safety_deposit: u256_to_big_decimal(&commitment.safety_deposit),
        deadline: commitment.deadline,
        state: state_to_db(commitment.state),
        src_escrow: commitment.src_escrow.map(|id| ByteArray(id.0 .0)),
        dst_escrow: commitment.dst_escrow.map(|id| ByteArray(id.0 .0)),
    })
}

fn commitment_from_db(row: database::commitments::Commitment) -> Result<Commitment, StoreError> {
    Ok(Commitment {
        order_hash: OrderHash(row.order_hash.0),
        resolver: address_from_db(row.resolver)?,
        partial_amount: u256_from_db(&row.partial_amount)?,
        accepted_price: u256_from_db(&row.accepted_price)?,
        safety_deposit: u256_from_db(&row.safety_deposit)?,
        deadline: row.deadline,
        state: state_from_db(row.state),
        src_escrow: row.src_escrow.map(|id| EscrowId(H256(id.0))),
        dst_escrow: row.dst_escrow.map(|id| EscrowId(H256(id.0))),
    })
}

fn event_row(
    order_hash: ByteArray<32>,
    label: EventLabel,
    timestamp: DateTime<Utc>,
) -> database::order_events::OrderEvent {
    database::order_events::OrderEvent {
        order_hash,
        timestamp,
        label: label_to_db(label),
    }
}

#[async_trait]
impl Storage for Postgres {
    async fn insert_order(&self, order: &Order, secret: &Secret) -> Result<(), StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["insert_order"])
            .start_timer();

        let row = order_to_db(order, secret)?;
        let total = u256_to_big_decimal(&order.data.making_amount);
        let mut ex = self.pool.begin().await?;
        database::orders::insert(&mut ex, &row).await.map_err(|err| {
            if err
                .as_database_error()
                .is_some_and(|err| err.is_unique_violation())
            {
                StoreError::DuplicateOrder
            } else {
                StoreError::from(err)
            }
        })?;
        database::fills::insert(&mut ex, &row.order_hash, &total).await?;
        database::order_events::insert_order_event(
            &mut ex,
            &event_row(
                row.order_hash,
                EventLabel::Created,
                order.metadata.creation_date,
            ),
        )
        .await?;
        ex.commit().await?;
        Ok(())
    }

    async fn order(&self, order_hash: &OrderHash) -> Result<Option<Order>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["single_order"])
            .start_timer();

        let hash = ByteArray(order_hash.0);
        let mut ex = self.pool.acquire().await?;
        let Some(row) = database::orders::single_order(&mut ex, &hash).await? else {
            return Ok(None);
        };
        let mut order = order_from_db(row)?;
        if let Some(fill) = database::fills::fill(&mut ex, &hash).await? {
            order.metadata.filled_amount = u256_from_db(&fill.filled_amount)?;
        }
        Ok(Some(order))
    }

    async fn secret(&self, order_hash: &OrderHash) -> Result<Option<Secret>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["secret"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let row = database::orders::single_order(&mut ex, &ByteArray(order_hash.0)).await?;
        Ok(row.map(|row| Secret(H256(row.secret.0))))
    }

    async fn fill(&self, order_hash: &OrderHash) -> Result<FillState, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["fill"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let fill = database::fills::fill(&mut ex, &ByteArray(order_hash.0))
            .await?
            .ok_or(StoreError::UnknownOrder)?;
        Ok(FillState {
            total: u256_from_db(&fill.total_amount)?,
            filled: u256_from_db(&fill.filled_amount)?,
        })
    }

    async fn active_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["active_orders"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let rows = database::orders::active_orders(&mut ex, now.timestamp()).await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let hash = row.order_hash;
            let mut order = order_from_db(row)?;
            if let Some(fill) = database::fills::fill(&mut ex, &hash).await? {
                order.metadata.filled_amount = u256_from_db(&fill.filled_amount)?;
            }
            orders.push(order);
        }
        Ok(orders)
    }

    async fn set_status(
        &self,
        order_hash: &OrderHash,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["set_status"])
            .start_timer();

        let hash = ByteArray(order_hash.0);
        let mut ex = self.pool.begin().await?;
        database::orders::set_status(&mut ex, &hash, status_to_db(status)).await?;
        database::order_events::insert_order_event(
            &mut ex,
            &event_row(hash, EventLabel::for_status(status), Utc::now()),
        )
        .await?;
        ex.commit().await?;
        Ok(())
    }

    async fn commit(&self, commitment: &Commitment) -> Result<(), StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["commit"])
            .start_timer();

        let hash = ByteArray(commitment.order_hash.0);
        let resolver = address_to_db(&commitment.resolver)?;
        let row = commitment_to_db(commitment)?;
        let amount = u256_to_big_decimal(&commitment.partial_amount);

        // Dropping the transaction on any error path rolls everything back,
        // including the capacity reservation.
        let mut ex = self.pool.begin().await?;
        if !database::fills::reserve(&mut ex, &hash, &amount).await? {
            let fill = database::fills::fill(&mut ex, &hash)
                .await?
                .ok_or(StoreError::UnknownOrder)?;
            return Err(if fill.filled_amount >= fill.total_amount {
                StoreError::AlreadyCommitted
            } else {
                StoreError::InsufficientRemaining
            });
        }
        let order = database::orders::single_order(&mut ex, &hash)
            .await?
            .ok_or(StoreError::UnknownOrder)?;
        if !status_from_db(order.status).is_committable() {
            return Err(StoreError::AlreadyCommitted);
        }
        if database::commitments::live_commitment(&mut ex, &hash, &resolver)
            .await?
            .is_some()
        {
            return Err(StoreError::AlreadyCommitted);
        }
        database::commitments::insert(&mut ex, &row).await?;
        database::orders::set_status(&mut ex, &hash, database::orders::OrderStatus::Committed)
            .await?;
        database::order_events::insert_order_event(
            &mut ex,
            &event_row(hash, EventLabel::Committed, Utc::now()),
        )
        .await?;
        ex.commit().await?;
        Ok(())
    }

    async fn commitments(&self, order_hash: &OrderHash) -> Result<Vec<Commitment>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["commitments_for_order"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let rows =
            database::commitments::commitments_for_order(&mut ex, &ByteArray(order_hash.0)).await?;
        rows.into_iter().map(commitment_from_db).collect()
    }

    async fn live_commitment(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
    ) -> Result<Option<Commitment>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["live_commitment"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let row = database::commitments::live_commitment(
            &mut ex,
            &ByteArray(order_hash.0),
            &address_to_db(resolver)?,
        )
        .await?;
        row.map(commitment_from_db).transpose()
    }

    async fn set_commitment_escrows(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
        src_escrow: EscrowId,
        dst_escrow: EscrowId,
    ) -> Result<(), StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["set_escrows"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let updated = database::commitments::set_escrows(
            &mut ex,
            &ByteArray(order_hash.0),
            &address_to_db(resolver)?,
            ByteArray(src_escrow.0 .0),
            ByteArray(dst_escrow.0 .0),
        )
        .await?;
        if !updated {
            return Err(StoreError::UnknownOrder);
        }
        Ok(())
    }

    async fn set_commitment_state(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
        state: CommitmentState,
    ) -> Result<(), StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["update_live_state"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let updated = database::commitments::update_live_state(
            &mut ex,
            &ByteArray(order_hash.0),
            &address_to_db(resolver)?,
            state_to_db(state),
        )
        .await?;
        if !updated {
            return Err(StoreError::UnknownOrder);
        }
        Ok(())
    }

    async fn mark_slashable(&self, now: DateTime<Utc>) -> Result<Vec<Commitment>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["mark_slashable"])
            .start_timer();

        let mut ex = self.pool.begin().await?;
        let slashed = database::commitments::slash_overdue(&mut ex, now).await?;
        let mut result = Vec::with_capacity(slashed.len());
        for row in slashed {
            let hash = row.order_hash;
            // The reserved capacity goes back on the market.
            database::fills::release(&mut ex, &hash, &row.partial_amount).await?;
            database::order_events::insert_order_event(
                &mut ex,
                &event_row(hash, EventLabel::Slashed, now),
            )
            .await?;
            let open = database::commitments::commitments_for_order(&mut ex, &hash)
                .await?
                .iter()
                .any(|commitment| {
                    matches!(
                        commitment.state,
                        database::commitments::CommitmentState::Pending
                            | database::commitments::CommitmentState::EscrowsReady
                    )
                });
            if !open {
                if let Some(order) = database::orders::single_order(&mut ex, &hash).await? {
                    if order.status == database::orders::OrderStatus::Committed {
                        database::orders::set_status(
                            &mut ex,
                            &hash,
                            database::orders::OrderStatus::RescueAvailable,
                        )
                        .await?;
                    }
                }
            }
            result.push(commitment_from_db(row)?);
        }
        ex.commit().await?;
        Ok(result)
    }

    async fn record_secret_revealed(
        &self,
        order_hash: &OrderHash,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["record_secret_revealed"])
            .start_timer();

        let hash = ByteArray(order_hash.0);
        let mut ex = self.pool.begin().await?;
        let first = database::orders::set_secret_revealed_at(&mut ex, &hash, at).await?;
        if first {
            database::order_events::insert_order_event(
                &mut ex,
                &event_row(hash, EventLabel::SecretRevealed, at),
            )
            .await?;
        }
        ex.commit().await?;
        Ok(first)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["expire_overdue"])
            .start_timer();

        let mut ex = self.pool.begin().await?;
        let rows = database::orders::overdue_orders(&mut ex, now.timestamp()).await?;
        let mut expired = Vec::with_capacity(rows.len());
        for row in rows {
            let hash = row.order_hash;
            database::orders::set_status(&mut ex, &hash, database::orders::OrderStatus::Expired)
                .await?;
            database::order_events::insert_order_event(
                &mut ex,
                &event_row(hash, EventLabel::Expired, now),
            )
            .await?;
            let mut order = order_from_db(row)?;
            order.metadata.status = OrderStatus::Expired;
            if let Some(fill) = database::fills::fill(&mut ex, &hash).await? {
                order.metadata.filled_amount = u256_from_db(&fill.filled_amount)?;
            }
            expired.push(order);
        }
        ex.commit().await?;
        Ok(expired)
    }

    async fn events(&self, order_hash: &OrderHash) -> Result<Vec<OrderEvent>, StoreError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["events_of"])
            .start_timer();

        let mut ex = self.pool.acquire().await?;
        let rows = database::order_events::events_of(&mut ex, &ByteArray(order_hash.0)).await?;
        Ok(rows
            .into_iter()
            .map(|row| OrderEvent {
                label: label_from_db(row.label),
                timestamp: row.timestamp,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn clean_store() -> Postgres {
        let db = Postgres::new("postgresql://").unwrap();
        let mut ex = db.pool.begin().await.unwrap();
        database::clear_DANGER_(&mut ex).await.unwrap();
        ex.commit().await.unwrap();
        db
    }

    fn order(hash: u8, making_amount: u64, deadline: u64) -> Order {
        Order {
            metadata: OrderMetadata {
                order_hash: OrderHash([hash; 32]),
                hashlock: H256([hash; 32]),
                ..Default::default()
            },
            data: OrderData {
                salt: 42.into(),
                maker: ChainAddress::Evm(primitive_types::H160([0xbe; 20])),
                making_amount: making_amount.into(),
                taking_amount: making_amount.into(),
                deadline,
                src_chain_id: 1,
                dst_chain_id: 137,
                auction_start_time: 100,
                auction_end_time: 400,
                start_price: 1_020_000_000_000_000_000u64.into(),
                end_price: 980_000_000_000_000_000u64.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn commitment(hash: u8, resolver: u8, amount: u64) -> Commitment {
        Commitment {
            order_hash: OrderHash([hash; 32]),
            resolver: ChainAddress::Evm(primitive_types::H160([resolver; 20])),
            partial_amount: amount.into(),
            accepted_price: 1_000_000_000_000_000_000u64.into(),
            safety_deposit: 1.into(),
            deadline: DateTime::UNIX_EPOCH + chrono::Duration::minutes(5),
            state: CommitmentState::Pending,
            src_escrow: None,
            dst_escrow: None,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_order_roundtrip() {
        let db = clean_store().await;

        let order = order(1, 100, 2_000);
        let secret = Secret(H256([7; 32]));
        db.insert_order(&order, &secret).await.unwrap();
        assert!(matches!(
            db.insert_order(&order, &secret).await,
            Err(StoreError::DuplicateOrder),
        ));

        let mut read = db.order(&order.metadata.order_hash).await.unwrap().unwrap();
        // Postgres keeps micros only while DateTime has nanos.
        read.metadata.creation_date = order.metadata.creation_date;
        assert_eq!(read, order);

        assert_eq!(
            db.secret(&order.metadata.order_hash).await.unwrap(),
            Some(secret),
        );
        let fill = db.fill(&order.metadata.order_hash).await.unwrap();
        assert_eq!(fill.total, 100.into());
        assert_eq!(fill.filled, 0.into());
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_commit_respects_capacity() {
        let db = clean_store().await;

        db.insert_order(&order(1, 100, 2_000), &Secret(Default::default()))
            .await
            .unwrap();

        db.commit(&commitment(1, 0xa1, 60)).await.unwrap();
        assert!(matches!(
            db.commit(&commitment(1, 0xa2, 50)).await,
            Err(StoreError::InsufficientRemaining),
        ));
        // A failed commit must leave no reservation behind.
        assert_eq!(
            db.fill(&OrderHash([1; 32])).await.unwrap().filled,
            60.into(),
        );
        db.commit(&commitment(1, 0xa2, 40)).await.unwrap();
        assert!(matches!(
            db.commit(&commitment(1, 0xa3, 1)).await,
            Err(StoreError::AlreadyCommitted),
        ));
        assert!(matches!(
            db.commit(&commitment(2, 0xa1, 1)).await,
            Err(StoreError::UnknownOrder),
        ));

        let read = db.order(&OrderHash([1; 32])).await.unwrap().unwrap();
        assert_eq!(read.metadata.status, OrderStatus::Committed);
        assert_eq!(read.metadata.filled_amount, 100.into());
        let live = db
            .live_commitment(&OrderHash([1; 32]), &commitment(1, 0xa1, 60).resolver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.partial_amount, 60.into());
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_slash_releases_capacity() {
        let db = clean_store().await;

        db.insert_order(&order(1, 100, 2_000), &Secret(Default::default()))
            .await
            .unwrap();
        db.commit(&commitment(1, 0xa1, 60)).await.unwrap();

        let overdue = DateTime::UNIX_EPOCH + chrono::Duration::minutes(6);
        let slashed = db.mark_slashable(overdue).await.unwrap();
        assert_eq!(slashed.len(), 1);
        assert_eq!(slashed[0].state, CommitmentState::Slashable);

        let read = db.order(&OrderHash([1; 32])).await.unwrap().unwrap();
        assert_eq!(read.metadata.status, OrderStatus::RescueAvailable);
        assert_eq!(read.metadata.filled_amount, 0.into());

        // Full capacity is available to the next resolver.
        db.commit(&commitment(1, 0xa2, 100)).await.unwrap();

        let labels: Vec<_> = db
            .events(&OrderHash([1; 32]))
            .await
            .unwrap()
            .into_iter()
            .map(|event| event.label)
            .collect();
        assert_eq!(
            labels,
            vec![
                EventLabel::Created,
                EventLabel::Committed,
                EventLabel::Slashed,
                EventLabel::Committed,
            ],
        );
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_reveal_and_escrow_lifecycle() {
        let db = clean_store().await;

        db.insert_order(&order(1, 100, 2_000), &Secret(Default::default()))
            .await
            .unwrap();
        let committed = commitment(1, 0xa1, 100);
        db.commit(&committed).await.unwrap();

        db.set_commitment_escrows(
            &OrderHash([1; 32]),
            &committed.resolver,
            EscrowId(H256([3; 32])),
            EscrowId(H256([4; 32])),
        )
        .await
        .unwrap();
        let live = db
            .live_commitment(&OrderHash([1; 32]), &committed.resolver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.state, CommitmentState::EscrowsReady);
        assert_eq!(live.src_escrow, Some(EscrowId(H256([3; 32]))));

        let at = Utc::now();
        assert!(db
            .record_secret_revealed(&OrderHash([1; 32]), at)
            .await
            .unwrap());
        assert!(!db
            .record_secret_revealed(&OrderHash([1; 32]), at)
            .await
            .unwrap());

        db.set_commitment_state(
            &OrderHash([1; 32]),
            &committed.resolver,
            CommitmentState::Completed,
        )
        .await
        .unwrap();
        assert!(db
            .live_commitment(&OrderHash([1; 32]), &committed.resolver)
            .await
            .unwrap()
            .is_none());
        let all = db.commitments(&OrderHash([1; 32])).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, CommitmentState::Completed);
    }
}
