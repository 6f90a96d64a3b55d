//! Storage keeping everything in process memory, used by tests and
//! single node deployments without a database.

use super::{EventLabel, FillState, OrderEvent, Storage, StoreError};
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
use std::collections::HashMap;
use tokio::sync::Mutex;

/// All state lives behind a single lock, which is what makes `commit`
/// atomic in this implementation.
#[derive(Default)]
pub struct InMemory {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    orders: HashMap<OrderHash, Order>,
    secrets: HashMap<OrderHash, Secret>,
    fills: HashMap<OrderHash, FillState>,
    commitments: HashMap<OrderHash, Vec<Commitment>>,
    events: HashMap<OrderHash, Vec<OrderEvent>>,
}

impl State {
    fn log(&mut self, order_hash: &OrderHash, label: EventLabel, timestamp: DateTime<Utc>) {
        self.events
            .entry(*order_hash)
            .or_default()
            .push(OrderEvent { label, timestamp });
    }

    /// The stored order with the current fill amount folded in.
    fn order_view(&self, order_hash: &OrderHash) -> Option<Order> {
        let mut order = self.orders.get(order_hash)?.clone();
        if let Some(fill) = self.fills.get(order_hash) {
            order.metadata.filled_amount = fill.filled;
        }
        Some(order)
    }
}

#[async_trait]
impl Storage for InMemory {
    async fn insert_order(&self, order: &Order, secret: &Secret) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let hash = order.metadata.order_hash;
        if state.orders.contains_key(&hash) {
            return Err(StoreError::DuplicateOrder);
        }
        state.orders.insert(hash, order.clone());
        state.secrets.insert(hash, *secret);
        state
            .fills
            .insert(hash, FillState::new(order.data.making_amount));
        state.log(&hash, EventLabel::Created, order.metadata.creation_date);
        Ok(())
    }

    async fn order(&self, order_hash: &OrderHash) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.order_view(order_hash))
    }

    async fn secret(&self, order_hash: &OrderHash) -> Result<Option<Secret>, StoreError> {
        Ok(self.state.lock().await.secrets.get(order_hash).copied())
    }

    async fn fill(&self, order_hash: &OrderHash) -> Result<FillState, StoreError> {
        self.state
            .lock()
            .await
            .fills
            .get(order_hash)
            .copied()
            .ok_or(StoreError::UnknownOrder)
    }

    async fn active_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let now = u64::try_from(now.timestamp()).unwrap_or(0);
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| order.metadata.status.is_committable() && order.data.deadline > now)
            .cloned()
            .collect();
        for order in &mut orders {
            if let Some(fill) = state.fills.get(&order.metadata.order_hash) {
                order.metadata.filled_amount = fill.filled;
            }
        }
        orders.sort_by_key(|order| order.metadata.creation_date);
        Ok(orders)
    }

    async fn set_status(
        &self,
        order_hash: &OrderHash,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(order_hash)
            .ok_or(StoreError::UnknownOrder)?;
        order.metadata.status = status;
        state.log(order_hash, EventLabel::for_status(status), Utc::now());
        Ok(())
    }

    async fn commit(&self, commitment: &Commitment) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let hash = commitment.order_hash;
        let status = state
            .orders
            .get(&hash)
            .ok_or(StoreError::UnknownOrder)?
            .metadata
            .status;
        if !status.is_committable() {
            return Err(StoreError::AlreadyCommitted);
        }
        let duplicate = state
            .commitments
            .get(&hash)
            .into_iter()
            .flatten()
            .any(|existing| existing.state.is_live() && existing.resolver == commitment.resolver);
        if duplicate {
            return Err(StoreError::AlreadyCommitted);
        }
        let fill = state.fills.get_mut(&hash).ok_or(StoreError::UnknownOrder)?;
        let remaining = fill.remaining();
        if remaining.is_zero() {
            return Err(StoreError::AlreadyCommitted);
        }
        if commitment.partial_amount > remaining {
            return Err(StoreError::InsufficientRemaining);
        }
        fill.filled += commitment.partial_amount;
        state
            .commitments
            .entry(hash)
            .or_default()
            .push(commitment.clone());
        if let Some(order) = state.orders.get_mut(&hash) {
            order.metadata.status = OrderStatus::Committed;
        }
        state.log(&hash, EventLabel::Committed, Utc::now());
        Ok(())
    }

    async fn commitments(&self, order_hash: &OrderHash) -> Result<Vec<Commitment>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .commitments
            .get(order_hash)
            .cloned()
            .unwrap_or_default())
    }

    async fn live_commitment(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
    ) -> Result<Option<Commitment>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .commitments
            .get(order_hash)
            .into_iter()
            .flatten()
            .find(|commitment| commitment.state.is_live() && &commitment.resolver == resolver)
            .cloned())
    }

    async fn set_commitment_escrows(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
        src_escrow: EscrowId,
        dst_escrow: EscrowId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let commitment = state
            .commitments
            .get_mut(order_hash)
            .into_iter()
            .flatten()
            .find(|commitment| {
                commitment.state == CommitmentState::Pending && &commitment.resolver == resolver
            })
            .ok_or(StoreError::UnknownOrder)?;
        commitment.state = CommitmentState::EscrowsReady;
        commitment.src_escrow = Some(src_escrow);
        commitment.dst_escrow = Some(dst_escrow);
        Ok(())
    }

    async fn set_commitment_state(
        &self,
        order_hash: &OrderHash,
        resolver: &ChainAddress,
        state: CommitmentState,
    ) -> Result<(), StoreError> {
        let mut guard = self.state.lock().await;
        let commitment = guard
            .commitments
            .get_mut(order_hash)
            .into_iter()
            .flatten()
            .find(|commitment| commitment.state.is_live() && &commitment.resolver == resolver)
            .ok_or(StoreError::UnknownOrder)?;
        commitment.state = state;
        Ok(())
    }

    async fn mark_slashable(&self, now: DateTime<Utc>) -> Result<Vec<Commitment>, StoreError> {
        let mut state = self.state.lock().await;
        let mut slashed = Vec::new();
        let hashes: Vec<_> = state.commitments.keys().copied().collect();
        for hash in hashes {
            let mut released = U256::zero();
            let mut count = 0;
            for commitment in state.commitments.get_mut(&hash).into_iter().flatten() {
                if commitment.state == CommitmentState::Pending && commitment.deadline <= now {
                    commitment.state = CommitmentState::Slashable;
                    released += commitment.partial_amount;
                    count += 1;
                    slashed.push(commitment.clone());
                }
            }
            if count == 0 {
                continue;
            }
            // The reserved capacity goes back on the market.
            if let Some(fill) = state.fills.get_mut(&hash) {
                fill.filled = fill.filled.saturating_sub(released);
            }
            for _ in 0..count {
                state.log(&hash, EventLabel::Slashed, now);
            }
            let any_live = state
                .commitments
                .get(&hash)
                .into_iter()
                .flatten()
                .any(|commitment| commitment.state.is_live());
            if any_live {
                continue;
            }
            if let Some(order) = state.orders.get_mut(&hash) {
                if order.metadata.status == OrderStatus::Committed {
                    order.metadata.status = OrderStatus::RescueAvailable;
                }
            }
        }
        Ok(slashed)
    }

    async fn record_secret_revealed(
        &self,
        order_hash: &OrderHash,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(order_hash)
            .ok_or(StoreError::UnknownOrder)?;
        if order.metadata.secret_revealed_at.is_some() {
            return Ok(false);
        }
        order.metadata.secret_revealed_at = Some(at);
        state.log(order_hash, EventLabel::SecretRevealed, at);
        Ok(true)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let mut state = self.state.lock().await;
        let now_ts = u64::try_from(now.timestamp()).unwrap_or(0);
        let overdue: Vec<_> = state
            .orders
            .values()
            .filter(|order| {
                order.metadata.status.is_committable() && order.data.deadline <= now_ts
            })
            .map(|order| order.metadata.order_hash)
            .collect();
        let mut expired = Vec::new();
        for hash in overdue {
            if let Some(order) = state.orders.get_mut(&hash) {
                order.metadata.status = OrderStatus::Expired;
            }
            state.log(&hash, EventLabel::Expired, now);
            if let Some(order) = state.order_view(&hash) {
                expired.push(order);
            }
        }
        Ok(expired)
    }

    async fn events(&self, order_hash: &OrderHash) -> Result<Vec<OrderEvent>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .get(order_hash)
            .cloned()
            .unwrap_or_default())
    }
}
