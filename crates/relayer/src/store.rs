//! Durable state behind the coordination logic.
//!
//! The trait makes commitment races a storage property: `commit` reserves
//! fill capacity and records the commitment in one atomic step, so the
//! in-memory map (one lock) and Postgres (one transaction) provide the same
//! single-winner guarantee.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    chain::ChainAddress,
    commitment::{Commitment, CommitmentState},
    escrow::EscrowId,
    order::{Order, OrderHash, OrderStatus},
    secret::Secret,
};
use primitive_types::U256;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an order with this hash already exists")]
    DuplicateOrder,
    #[error("no order with this hash")]
    UnknownOrder,
    #[error("the capacity is already committed")]
    AlreadyCommitted,
    #[error("insufficient remaining capacity")]
    InsufficientRemaining,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// Fill accounting for one order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FillState {
    pub total: U256,
    pub filled: U256,
}

impl FillState {
    pub fn new(total: U256) -> Self {
        Self {
            total,
            filled: U256::zero(),
        }
    }

    pub fn remaining(&self) -> U256 {
        self.total.saturating_sub(self.filled)
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled >= self.total
    }
}

/// One entry of an order's audit trail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OrderEvent {
    pub label: EventLabel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum EventLabel {
    Created,
    Committed,
    EscrowsReady,
    UserFundsTransferred,
    SecretRevealed,
    Completed,
    Slashed,
    Expired,
}

impl EventLabel {
    /// The audit label a status transition is recorded under.
    pub fn for_status(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Broadcasted => Self::Created,
            OrderStatus::Committed => Self::Committed,
            OrderStatus::EscrowsReady => Self::EscrowsReady,
            OrderStatus::UserFundsTransferred => Self::UserFundsTransferred,
            OrderStatus::Completed => Self::Completed,
            OrderStatus::RescueAvailable => Self::Slashed,
            OrderStatus::Expired => Self::Expired,
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Persists a new order together with its secret and an empty fill
    /// record, and logs the created event. Fails with
    /// [`StoreError::DuplicateOrder`] when the hash is already known.
    async fn insert_order(&self, order: &Order, secret: &Secret) -> Result<(), StoreError>;

    /// The order with its current fill amount, if known.
    async fn order(&self, order_hash: &OrderHash) -> Result<Option<Order>, StoreError>;

    async fn secret(&self, order_hash: &OrderHash) -> Result<Option<Secret>, StoreError>;

    async fn fill(&self, order_hash: &OrderHash) -> Result<FillState, StoreError>;

    /// Orders still accepting commitments whose deadline is after `now`.
    async fn active_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;

    /// Sets the order status and logs the matching audit event.
    async fn set_status(&self, order_hash: &OrderHash, status: OrderStatus)
        -> Result<(), StoreError>;

    /// The single-winner step: atomically checks that the order accepts
    /// commitments, reserves the partial amount against the remaining
    /// capacity, refuses a second live commitment by the same resolver and
    /// records the new pending commitment, moving the order to `Committed`.
    ///
    /// Returns [`StoreError::AlreadyCommitted`] when the capacity race is
    /// lost outright (nothing left, or this resolver already holds a live
    /// commitment) and [`StoreError::InsufficientRemaining`] when some
    /// capacity remains but less than requested.
    async fn commit(&self, commitment: &Commitment) -> Result<(), StoreError>;

    async fn commitments(&self, order_hash: &OrderHash) -> Result<Vec<Commitment>, StoreError>;

    async fn live_commitment(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
    ) -> Result<Option<Commitment>, StoreError>;

    /// Records the verified escrow pair and moves the resolver's pending
    /// commitment to `EscrowsReady`. Fails with [`StoreError::UnknownOrder`]
    /// when no pending commitment exists.
    async fn set_commitment_escrows(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
        src_escrow: EscrowId,
        dst_escrow: EscrowId,
    ) -> Result<(), StoreError>;

    /// Moves the resolver's live commitment to a new state.
    async fn set_commitment_state(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
        state: CommitmentState,
    ) -> Result<(), StoreError>;

    /// Marks pending commitments whose deadline passed as slashable,
    /// releases their reserved capacity, and flags their orders as
    /// `RescueAvailable` when no other live commitment is making progress.
    /// Returns the slashed commitments.
    async fn mark_slashable(&self, now: DateTime<Utc>) -> Result<Vec<Commitment>, StoreError>;

    /// Compare-and-set on the reveal timestamp; returns whether this call
    /// was the first. Logged as a secret-revealed event on success.
    async fn record_secret_revealed(
        &self,
        order_hash: &OrderHash,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Marks orders past their deadline that never reached settlement as
    /// `Expired` and returns them.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;

    /// The order's audit trail in insertion order.
    async fn events(&self, order_hash: &OrderHash) -> Result<Vec<OrderEvent>, StoreError>;
}
