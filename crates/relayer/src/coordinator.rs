//! Coordination core of the relayer.
//!
//! Owns every state transition an order can take, from intake over the
//! commitment race to settlement and the timeout sweeps. The HTTP layer is
//! a thin shell over this type, which keeps the sequencing rules testable
//! without a server.
//!
//! Two clocks are in play. Order deadlines and auction prices are judged
//! against the source chain's clock, because those windows are enforced by
//! the escrows. Commitment deadlines are an off chain promise between the
//! relayer and a resolver and run on wall clock time.

use crate::store::{Storage, StoreError};
use chrono::{DateTime, Duration, Utc};
use escrow::{
    chain::{ChainError, ChainRegistry, EscrowView},
    state::EscrowState,
};
use model::{
    api::{OrderStatusView, PriceResponse},
    auction,
    chain::ChainAddress,
    commitment::{Commitment, CommitmentState},
    escrow::EscrowId,
    order::{
        Order, OrderCreation, OrderHash, OrderMetadata, OrderStatus, ValidationError,
    },
    timelocks::{Side, Stage},
};
use primitive_types::{H160, U256};
use std::sync::Arc;
use thiserror::Error;

pub struct Coordinator {
    store: Arc<dyn Storage>,
    chains: ChainRegistry,
    /// Settlement contract address baked into the signing domain.
    verifying_contract: H160,
    /// How long a resolver has to prove its escrows after committing.
    commitment_deadline: Duration,
    /// Native safety deposit per unit of maker asset, 18 decimal fixed
    /// point. Scaled to the committed slice on both escrows.
    per_unit_safety_deposit: U256,
    /// Address the relayer acts under when it touches an escrow itself.
    relayer: ChainAddress,
}

#[derive(Debug, Error)]
pub enum CreateSwapError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("chain {0} is not supported")]
    UnsupportedChain(u64),
    #[error("an order with this hash already exists")]
    Duplicate,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(StoreError),
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("no order with this hash")]
    UnknownOrder,
    #[error("order in status {0} does not accept commitments")]
    NotCommittable(OrderStatus),
    #[error("the order deadline has passed")]
    OrderExpired,
    #[error("committed amount must not be zero")]
    ZeroAmount,
    #[error("accepted price is outside the auction price range")]
    InvalidPrice,
    #[error("committed amount exceeds the remaining capacity")]
    InsufficientRemaining,
    #[error("the capacity is already committed")]
    AlreadyCommitted,
    #[error("chain {0} is not supported")]
    UnsupportedChain(u64),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(StoreError),
}

#[derive(Debug, Error)]
pub enum EscrowsReadyError {
    #[error("no order with this hash")]
    UnknownOrder,
    #[error("the resolver holds no live commitment on this order")]
    UnknownCommitment,
    #[error("the commitment already has verified escrows")]
    AlreadyReady,
    #[error("chain {0} is not supported")]
    UnsupportedChain(u64),
    #[error("no escrow {0} on chain")]
    MissingEscrow(EscrowId),
    #[error("source escrow rejected: {0}")]
    SrcEscrow(&'static str),
    #[error("destination escrow rejected: {0}")]
    DstEscrow(&'static str),
    #[error("timelock stages are not in chronological order")]
    InvalidTimelock,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(StoreError),
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no order with this hash")]
    UnknownOrder,
    #[error("the resolver holds no live commitment on this order")]
    UnknownCommitment,
    #[error("the commitment has no verified escrows yet")]
    EscrowsNotReady,
    #[error("the source escrow has not been withdrawn")]
    SrcNotWithdrawn,
    #[error("chain {0} is not supported")]
    UnsupportedChain(u64),
    #[error("no escrow {0} on chain")]
    MissingEscrow(EscrowId),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(StoreError),
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("no order with this hash")]
    UnknownOrder,
    #[error("chain {0} is not supported")]
    UnsupportedChain(u64),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn Storage>,
        chains: ChainRegistry,
        verifying_contract: H160,
        commitment_deadline: Duration,
        per_unit_safety_deposit: U256,
        relayer: ChainAddress,
    ) -> Self {
        Self {
            store,
            chains,
            verifying_contract,
            commitment_deadline,
            per_unit_safety_deposit,
            relayer,
        }
    }

    /// Validates a maker submission and broadcasts it as a new order.
    ///
    /// The secret stays in the store, only its hashlock becomes part of the
    /// public order.
    pub async fn create_swap(
        &self,
        creation: OrderCreation,
    ) -> Result<OrderHash, CreateSwapError> {
        for chain_id in [creation.data.src_chain_id, creation.data.dst_chain_id] {
            if !self.chains.supports(chain_id) {
                return Err(CreateSwapError::UnsupportedChain(chain_id));
            }
        }
        let domain = creation.data.domain(self.verifying_contract);
        creation.verify_signature(&domain)?;
        let src_chain = self
            .chains
            .get(creation.data.src_chain_id)
            .ok_or(CreateSwapError::UnsupportedChain(creation.data.src_chain_id))?;
        let now = src_chain.now().await?;
        creation.data.validate(now)?;

        let order_hash = creation.data.hash(&domain);
        let OrderCreation {
            data,
            secret,
            signature,
        } = creation;
        let order = Order {
            metadata: OrderMetadata {
                order_hash,
                status: OrderStatus::Broadcasted,
                creation_date: Utc::now(),
                hashlock: secret.hashlock(),
                filled_amount: U256::zero(),
                secret_revealed_at: None,
            },
            data,
            signature,
        };
        self.store
            .insert_order(&order, &secret)
            .await
            .map_err(|err| match err {
                StoreError::DuplicateOrder => CreateSwapError::Duplicate,
                other => CreateSwapError::Storage(other),
            })?;

        Metrics::get().orders_created.inc();
        tracing::info!(order = %order_hash, maker = %order.data.maker, "order broadcasted");
        Ok(order_hash)
    }

    /// Runs the single winner capacity race for a resolver.
    ///
    /// The store performs the actual reservation atomically; everything here
    /// is validation plus assembling the commitment terms.
    pub async fn commit_resolver(
        &self,
        order_hash: OrderHash,
        resolver: ChainAddress,
        partial_amount: U256,
        accepted_price: U256,
    ) -> Result<Commitment, CommitError> {
        let order = self
            .store
            .order(&order_hash)
            .await
            .map_err(CommitError::Storage)?
            .ok_or(CommitError::UnknownOrder)?;
        let status = order.metadata.status;
        if !status.is_committable() {
            return Err(CommitError::NotCommittable(status));
        }
        let src_chain = self
            .chains
            .get(order.data.src_chain_id)
            .ok_or(CommitError::UnsupportedChain(order.data.src_chain_id))?;
        if src_chain.now().await? > order.data.deadline {
            return Err(CommitError::OrderExpired);
        }
        if partial_amount.is_zero() {
            return Err(CommitError::ZeroAmount);
        }
        let auction = order.data.auction();
        let floor = auction.start_price.min(auction.end_price);
        let ceiling = auction.start_price.max(auction.end_price);
        if accepted_price < floor || accepted_price > ceiling {
            return Err(CommitError::InvalidPrice);
        }

        let commitment = Commitment {
            order_hash,
            resolver,
            partial_amount,
            accepted_price,
            safety_deposit: auction::scale(partial_amount, self.per_unit_safety_deposit),
            deadline: Utc::now() + self.commitment_deadline,
            state: CommitmentState::Pending,
            src_escrow: None,
            dst_escrow: None,
        };
        self.store
            .commit(&commitment)
            .await
            .map_err(|err| match err {
                StoreError::UnknownOrder => CommitError::UnknownOrder,
                StoreError::AlreadyCommitted => CommitError::AlreadyCommitted,
                StoreError::InsufficientRemaining => CommitError::InsufficientRemaining,
                other => CommitError::Storage(other),
            })?;

        Metrics::get().commitments_accepted.inc();
        tracing::info!(
            order = %order_hash,
            resolver = %commitment.resolver,
            amount = %commitment.partial_amount,
            "commitment accepted"
        );
        Ok(commitment)
    }

    /// Verifies a resolver's escrows on both chains and settles the slice.
    ///
    /// On success the maker's pre approved principal is locked into the
    /// source escrow and the secret is published by withdrawing the
    /// destination escrow to the maker. Publication is recorded before the
    /// withdraw call, so a crash in between cannot reveal twice.
    pub async fn escrows_ready(
        &self,
        order_hash: OrderHash,
        resolver: ChainAddress,
        src_escrow: EscrowId,
        dst_escrow: EscrowId,
    ) -> Result<OrderStatus, EscrowsReadyError> {
        let order = self
            .store
            .order(&order_hash)
            .await
            .map_err(EscrowsReadyError::Storage)?
            .ok_or(EscrowsReadyError::UnknownOrder)?;
        let commitment = self
            .store
            .live_commitment(&order_hash, &resolver)
            .await
            .map_err(EscrowsReadyError::Storage)?
            .ok_or(EscrowsReadyError::UnknownCommitment)?;
        if commitment.state != CommitmentState::Pending {
            return Err(EscrowsReadyError::AlreadyReady);
        }

        let src_chain = self
            .chains
            .get(order.data.src_chain_id)
            .ok_or(EscrowsReadyError::UnsupportedChain(order.data.src_chain_id))?;
        let dst_chain = self
            .chains
            .get(order.data.dst_chain_id)
            .ok_or(EscrowsReadyError::UnsupportedChain(order.data.dst_chain_id))?;
        let src_view = src_chain
            .escrow(src_escrow)
            .await?
            .ok_or(EscrowsReadyError::MissingEscrow(src_escrow))?;
        verify_src_escrow(&order, &commitment, &src_view)?;
        let dst_view = dst_chain
            .escrow(dst_escrow)
            .await?
            .ok_or(EscrowsReadyError::MissingEscrow(dst_escrow))?;
        let src_cancellation = src_view.immutables.timelocks.deadline(Stage::SrcCancellation);
        verify_dst_escrow(&order, &commitment, &dst_view, src_cancellation)?;

        self.store
            .set_commitment_escrows(&order_hash, &resolver, src_view.id, dst_view.id)
            .await
            .map_err(|err| match err {
                // A concurrent call advanced the commitment first.
                StoreError::UnknownOrder => EscrowsReadyError::AlreadyReady,
                other => EscrowsReadyError::Storage(other),
            })?;
        self.store
            .set_status(&order_hash, OrderStatus::EscrowsReady)
            .await
            .map_err(EscrowsReadyError::Storage)?;

        // Only now does the maker's principal move.
        src_chain
            .deposit_principal(src_view.id, order.data.maker.clone(), commitment.partial_amount)
            .await?;
        self.store
            .set_status(&order_hash, OrderStatus::UserFundsTransferred)
            .await
            .map_err(EscrowsReadyError::Storage)?;
        tracing::info!(
            order = %order_hash,
            resolver = %resolver,
            amount = %commitment.partial_amount,
            "escrows verified, maker principal locked"
        );

        let secret = self
            .store
            .secret(&order_hash)
            .await
            .map_err(EscrowsReadyError::Storage)?
            .ok_or_else(|| {
                EscrowsReadyError::Storage(StoreError::Database(anyhow::anyhow!(
                    "order {order_hash} has no stored secret"
                )))
            })?;
        let first = self
            .store
            .record_secret_revealed(&order_hash, Utc::now())
            .await
            .map_err(EscrowsReadyError::Storage)?;
        if first {
            Metrics::get().secrets_published.inc();
            tracing::info!(order = %order_hash, "publishing swap secret");
        }
        // Pays the maker on the destination chain and puts the secret on
        // public record as a side effect. Subsequent slices of the same
        // order repeat this for their own escrow with the already public
        // secret.
        dst_chain.withdraw(dst_view.id, self.relayer.clone(), secret).await?;

        Ok(OrderStatus::UserFundsTransferred)
    }

    /// Closes out a commitment after the resolver claimed the source escrow.
    pub async fn notify_completion(
        &self,
        order_hash: OrderHash,
        resolver: ChainAddress,
    ) -> Result<OrderStatus, CompletionError> {
        let order = self
            .store
            .order(&order_hash)
            .await
            .map_err(CompletionError::Storage)?
            .ok_or(CompletionError::UnknownOrder)?;
        let commitment = self
            .store
            .live_commitment(&order_hash, &resolver)
            .await
            .map_err(CompletionError::Storage)?
            .ok_or(CompletionError::UnknownCommitment)?;
        if commitment.state != CommitmentState::EscrowsReady {
            return Err(CompletionError::EscrowsNotReady);
        }
        let src_escrow = commitment
            .src_escrow
            .ok_or(CompletionError::EscrowsNotReady)?;
        let src_chain = self
            .chains
            .get(order.data.src_chain_id)
            .ok_or(CompletionError::UnsupportedChain(order.data.src_chain_id))?;
        let view = src_chain
            .escrow(src_escrow)
            .await?
            .ok_or(CompletionError::MissingEscrow(src_escrow))?;
        if view.state != EscrowState::Withdrawn {
            return Err(CompletionError::SrcNotWithdrawn);
        }

        self.store
            .set_commitment_state(&order_hash, &resolver, CommitmentState::Completed)
            .await
            .map_err(CompletionError::Storage)?;
        self.store
            .set_status(&order_hash, OrderStatus::Completed)
            .await
            .map_err(CompletionError::Storage)?;

        Metrics::get().orders_completed.inc();
        tracing::info!(order = %order_hash, resolver = %resolver, "swap completed");
        Ok(OrderStatus::Completed)
    }

    pub async fn order_status(
        &self,
        order_hash: &OrderHash,
    ) -> Result<OrderStatusView, StatusError> {
        let order = self
            .store
            .order(order_hash)
            .await?
            .ok_or(StatusError::UnknownOrder)?;
        let commitments = self.store.commitments(order_hash).await?;
        let remaining = order.remaining_amount();
        Ok(OrderStatusView {
            order_hash: order.metadata.order_hash,
            status: order.metadata.status,
            created_at: order.metadata.creation_date,
            total_amount: order.data.making_amount,
            filled_amount: order.metadata.filled_amount,
            remaining_amount: remaining,
            fully_filled: remaining.is_zero(),
            commitments,
            secret_revealed_at: order.metadata.secret_revealed_at,
        })
    }

    /// The auction price as of the source chain's clock, with the taker
    /// amount a resolver would owe for the remaining capacity at it.
    pub async fn auction_price(
        &self,
        order_hash: &OrderHash,
    ) -> Result<PriceResponse, StatusError> {
        let order = self
            .store
            .order(order_hash)
            .await?
            .ok_or(StatusError::UnknownOrder)?;
        let src_chain = self
            .chains
            .get(order.data.src_chain_id)
            .ok_or(StatusError::UnsupportedChain(order.data.src_chain_id))?;
        let now = src_chain.now().await?;
        let auction = order.data.auction();
        let current_price = auction.current_price(now);
        let remaining = order.remaining_amount();
        Ok(PriceResponse {
            success: true,
            order_hash: *order_hash,
            current_price,
            remaining_amount: remaining,
            taking_amount_for_remaining: auction::scale(remaining, current_price),
            auction_start_time: auction.start_time,
            auction_end_time: auction.end_time,
        })
    }

    /// Orders resolvers can still discover fresh capacity on. Partially
    /// committed orders are not rebroadcast, their remaining capacity is
    /// reachable through the status endpoint by anyone already tracking
    /// them.
    pub async fn active_orders(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.store.active_orders(Utc::now()).await?;
        Ok(orders
            .into_iter()
            .filter(|order| {
                matches!(
                    order.metadata.status,
                    OrderStatus::Broadcasted | OrderStatus::RescueAvailable
                )
            })
            .collect())
    }

    /// One pass of the timeout policy: slash commitments that missed their
    /// escrow deadline and expire orders nobody filled in time.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let slashed = self.store.mark_slashable(now).await?;
        if !slashed.is_empty() {
            Metrics::get()
                .commitments_slashed
                .inc_by(slashed.len() as u64);
        }
        for commitment in &slashed {
            tracing::info!(
                order = %commitment.order_hash,
                resolver = %commitment.resolver,
                "commitment slashed, capacity released"
            );
        }

        let expired = self.store.expire_overdue(now).await?;
        if !expired.is_empty() {
            Metrics::get().orders_expired.inc_by(expired.len() as u64);
        }
        for order in &expired {
            tracing::info!(order = %order.metadata.order_hash, "order expired");
            self.cancel_escrows(order).await;
        }
        Ok(())
    }

    /// Best effort cancellation of whatever escrows are on record for an
    /// expired order. The timelocks may not allow a cancel yet, in which
    /// case the funds stay claimable through the escrow's own timeout path.
    async fn cancel_escrows(&self, order: &Order) {
        let commitments = match self.store.commitments(&order.metadata.order_hash).await {
            Ok(commitments) => commitments,
            Err(err) => {
                tracing::warn!(?err, "commitment lookup for escrow cancel failed");
                return;
            }
        };
        for commitment in commitments {
            let escrows = [
                (order.data.src_chain_id, commitment.src_escrow),
                (order.data.dst_chain_id, commitment.dst_escrow),
            ];
            for (chain_id, escrow) in escrows {
                let (Some(chain), Some(escrow)) = (self.chains.get(chain_id), escrow) else {
                    continue;
                };
                if let Err(err) = chain.cancel(escrow, self.relayer.clone()).await {
                    tracing::debug!(%escrow, ?err, "escrow cancel attempt failed");
                }
            }
        }
    }

    /// Runs [`Coordinator::sweep`] on a fixed interval until aborted.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::task::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                if let Err(err) = self.sweep(Utc::now()).await {
                    tracing::error!(?err, "timeout sweep failed");
                }
            }
        })
    }
}

fn verify_src_escrow(
    order: &Order,
    commitment: &Commitment,
    view: &EscrowView,
) -> Result<(), EscrowsReadyError> {
    let reject = EscrowsReadyError::SrcEscrow;
    if view.side != Side::Src {
        return Err(reject("escrow is on the wrong side"));
    }
    if view.state != EscrowState::Active {
        return Err(reject("escrow is not active"));
    }
    let immutables = &view.immutables;
    if immutables.order_hash != order.metadata.order_hash {
        return Err(reject("order hash mismatch"));
    }
    if immutables.hashlock != order.metadata.hashlock {
        return Err(reject("hashlock mismatch"));
    }
    if immutables.token != order.data.maker_asset {
        return Err(reject("token is not the maker asset"));
    }
    if immutables.maker != order.data.maker {
        return Err(reject("maker mismatch"));
    }
    if immutables.taker != commitment.resolver {
        return Err(reject("taker is not the committed resolver"));
    }
    if immutables.amount != commitment.partial_amount {
        return Err(reject("amount does not match the committed slice"));
    }
    if immutables.safety_deposit != commitment.safety_deposit {
        return Err(reject("safety deposit does not match the commitment"));
    }
    if !immutables.timelocks.durations().is_ordered() {
        return Err(EscrowsReadyError::InvalidTimelock);
    }
    // The maker principal arrives only after this verification, so the
    // source side is funded once the resolver's deposit is in.
    if view.safety < immutables.safety_deposit {
        return Err(reject("safety deposit is not funded"));
    }
    Ok(())
}

fn verify_dst_escrow(
    order: &Order,
    commitment: &Commitment,
    view: &EscrowView,
    src_cancellation: u64,
) -> Result<(), EscrowsReadyError> {
    let reject = EscrowsReadyError::DstEscrow;
    if view.side != Side::Dst {
        return Err(reject("escrow is on the wrong side"));
    }
    if view.state != EscrowState::Active {
        return Err(reject("escrow is not active"));
    }
    let immutables = &view.immutables;
    if immutables.order_hash != order.metadata.order_hash {
        return Err(reject("order hash mismatch"));
    }
    if immutables.hashlock != order.metadata.hashlock {
        return Err(reject("hashlock mismatch"));
    }
    if immutables.token != order.data.taker_asset {
        return Err(reject("token is not the taker asset"));
    }
    if immutables.maker != order.data.beneficiary() {
        return Err(reject("maker is not the order's beneficiary"));
    }
    if immutables.taker != commitment.resolver {
        return Err(reject("taker is not the committed resolver"));
    }
    if immutables.amount != commitment.taking_amount() {
        return Err(reject("amount does not match the accepted price"));
    }
    if immutables.safety_deposit != commitment.safety_deposit {
        return Err(reject("safety deposit does not match the commitment"));
    }
    if !immutables.timelocks.durations().is_ordered() {
        return Err(EscrowsReadyError::InvalidTimelock);
    }
    if !view.is_funded() {
        return Err(reject("escrow is not fully funded"));
    }
    if view.src_cancellation != Some(src_cancellation) {
        return Err(reject("source cancellation deadline mismatch"));
    }
    Ok(())
}

/// Metrics of the coordination flow.
#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "coordinator")]
struct Metrics {
    /// Orders accepted and broadcast to resolvers.
    orders_created: prometheus::IntCounter,
    /// Commitments that won their capacity race.
    commitments_accepted: prometheus::IntCounter,
    /// Commitments slashed for missing their escrow deadline.
    commitments_slashed: prometheus::IntCounter,
    /// Secrets published on a destination chain.
    secrets_published: prometheus::IntCounter,
    /// Orders settled end to end.
    orders_completed: prometheus::IntCounter,
    /// Orders that expired with capacity left over.
    orders_expired: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        // Always succeeds with the default registry.
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
