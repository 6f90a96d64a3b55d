//! Follows a single auction from discovery to settlement.

use crate::{
    relayer_api::{CommitOutcome, RelayerClient},
    strategy::Strategy,
};
use anyhow::{bail, Context, Result};
use escrow::chain::{Chain, ChainRegistry};
use model::{
    api::{CommitRequest, CompletionRequest, EscrowsReadyRequest},
    chain::ChainAddress,
    escrow::{EscrowId, EscrowImmutables},
    order::{Order, OrderHash},
    secret::Secret,
    timelocks::{Durations, Side, Stage},
};
use primitive_types::U256;
use std::{sync::Arc, time::Duration};

/// How a watched order left the resolver's hands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Other resolvers drained the capacity before our commit landed.
    Filled,
    /// The order deadline passed without the auction reaching an acceptable
    /// price.
    Expired,
    /// We committed a slice, funded both escrows and collected the source
    /// side principal.
    Settled {
        partial_amount: U256,
        accepted_price: U256,
    },
}

/// Where the watch stands for one order. [`OrderWatcher::settle`] steps the
/// machine until it reaches [`Phase::Done`].
enum Phase {
    /// Discovered but not yet examined.
    Idle,
    /// Polling the auction price, waiting for it to cross our threshold.
    Watching,
    /// The relayer reserved capacity for us, escrows still need to go up.
    Committed {
        partial_amount: U256,
        accepted_price: U256,
    },
    /// Both escrows deployed and funded, waiting to collect the principal.
    Executing(Funded),
    /// Nothing left to do for this order.
    Done(Outcome),
}

/// Escrow context carried from funding into collection.
struct Funded {
    src_escrow: EscrowId,
    src_cancellation: u64,
    withdraw_at: u64,
    partial_amount: U256,
    accepted_price: U256,
}

pub struct OrderWatcher {
    pub relayer: Arc<dyn RelayerClient>,
    pub chains: ChainRegistry,
    pub strategy: Strategy,
    pub resolver: ChainAddress,
    /// Native safety deposit per unit of committed capacity, must match the
    /// relayer's setting or escrow verification fails.
    pub per_unit_safety_deposit: U256,
    /// Timelock schedule stamped into every escrow we deploy.
    pub durations: Durations,
    pub poll_interval: Duration,
    pub fast_poll_interval: Duration,
}

impl OrderWatcher {
    /// Drives one order through the watch machine. Returns once the order
    /// needs no further attention from this resolver.
    pub async fn settle(&self, order: Order) -> Result<Outcome> {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => Phase::Watching,
                Phase::Watching => self.watch(&order).await?,
                Phase::Committed {
                    partial_amount,
                    accepted_price,
                } => {
                    self.build_escrows(&order, partial_amount, accepted_price)
                        .await?
                }
                Phase::Executing(funded) => self.collect(&order, funded).await?,
                Phase::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// One poll of the auction: check the deadline and the price, commit if
    /// the price crossed our threshold.
    async fn watch(&self, order: &Order) -> Result<Phase> {
        let order_hash = order.metadata.order_hash;
        let src_chain = self.chain(order.data.src_chain_id)?;
        // The order deadline lives on the source chain's clock.
        if src_chain.now().await? > order.data.deadline {
            return Ok(Phase::Done(Outcome::Expired));
        }
        let price = self.relayer.auction_price(order_hash).await?;
        if price.remaining_amount.is_zero() {
            return Ok(Phase::Done(Outcome::Filled));
        }
        if self.strategy.is_profitable(price.current_price) {
            let request = CommitRequest {
                order_hash,
                resolver: self.resolver.clone(),
                partial_amount: self.strategy.fill_amount(price.remaining_amount),
                accepted_price: price.current_price,
            };
            match self.relayer.commit(&request).await? {
                CommitOutcome::Committed(commitment) => {
                    Metrics::get().commitments_won.inc();
                    tracing::info!(
                        %order_hash,
                        amount = %commitment.partial_amount,
                        price = %request.accepted_price,
                        deadline = %commitment.commitment_deadline,
                        "commitment accepted"
                    );
                    return Ok(Phase::Committed {
                        partial_amount: commitment.partial_amount,
                        accepted_price: request.accepted_price,
                    });
                }
                CommitOutcome::AlreadyTaken => {
                    Metrics::get().commitments_lost.inc();
                    let status = self.relayer.order_status(order_hash).await?;
                    if !status.status.is_committable() {
                        return Ok(Phase::Done(Outcome::Filled));
                    }
                    // A live commitment holds the capacity. It frees up
                    // again if the holder gets slashed, so keep watching.
                    tracing::debug!(%order_hash, "capacity taken, keeping watch");
                }
            }
        }
        tokio::time::sleep(self.poll_cadence(price.current_price)).await;
        Ok(Phase::Watching)
    }

    /// Deploys and funds the escrow pair for a won commitment, then hands
    /// both addresses to the relayer for verification.
    async fn build_escrows(
        &self,
        order: &Order,
        partial_amount: U256,
        accepted_price: U256,
    ) -> Result<Phase> {
        let order_hash = order.metadata.order_hash;
        let src_chain = self.chain(order.data.src_chain_id)?;
        let dst_chain = self.chain(order.data.dst_chain_id)?;
        let timelocks = self.durations.pack();

        let src_immutables = EscrowImmutables::for_source(
            order_hash,
            &order.data,
            order.metadata.hashlock,
            self.resolver.clone(),
            partial_amount,
            self.per_unit_safety_deposit,
            timelocks,
        );
        let src_escrow = src_chain
            .deploy_escrow(src_immutables.clone(), Side::Src, None)
            .await?;
        // The relayer moves the maker principal in once it has verified both
        // escrows. The resolver only backs the source side with its deposit.
        src_chain
            .deposit_safety(
                src_escrow,
                self.resolver.clone(),
                src_immutables.safety_deposit,
            )
            .await?;
        let src_view = src_chain
            .escrow(src_escrow)
            .await?
            .context("source escrow disappeared after deployment")?;
        let src_cancellation = src_view
            .immutables
            .timelocks
            .deadline(Stage::SrcCancellation);
        let withdraw_at = src_view.immutables.timelocks.deadline(Stage::SrcWithdrawal);

        let dst_immutables = EscrowImmutables::for_destination(
            order_hash,
            &order.data,
            order.metadata.hashlock,
            self.resolver.clone(),
            partial_amount,
            accepted_price,
            self.per_unit_safety_deposit,
            timelocks,
        );
        let dst_escrow = dst_chain
            .deploy_escrow(dst_immutables.clone(), Side::Dst, Some(src_cancellation))
            .await?;
        dst_chain
            .deposit_safety(
                dst_escrow,
                self.resolver.clone(),
                dst_immutables.safety_deposit,
            )
            .await?;
        dst_chain
            .deposit_principal(dst_escrow, self.resolver.clone(), dst_immutables.amount)
            .await?;
        tracing::info!(%order_hash, %src_escrow, %dst_escrow, "escrows deployed and funded");

        let ack = self
            .relayer
            .escrows_ready(&EscrowsReadyRequest {
                order_hash,
                resolver: self.resolver.clone(),
                src_escrow,
                dst_escrow,
            })
            .await?;
        tracing::debug!(%order_hash, status = %ack.status, "escrows verified by the relayer");

        Ok(Phase::Executing(Funded {
            src_escrow,
            src_cancellation,
            withdraw_at,
            partial_amount,
            accepted_price,
        }))
    }

    /// Waits for the secret to land on the destination chain, then spends
    /// the source escrow and reports completion.
    async fn collect(&self, order: &Order, funded: Funded) -> Result<Phase> {
        let order_hash = order.metadata.order_hash;
        let src_chain = self.chain(order.data.src_chain_id)?;
        let dst_chain = self.chain(order.data.dst_chain_id)?;

        let secret = self
            .wait_for_secret(dst_chain, order_hash, funded.src_cancellation)
            .await?;

        // Collecting the principal needs the resolver exclusive window.
        let now = src_chain.now().await?;
        if now < funded.withdraw_at {
            tokio::time::sleep(Duration::from_secs(funded.withdraw_at - now)).await;
        }
        src_chain
            .withdraw(funded.src_escrow, self.resolver.clone(), secret)
            .await?;

        let ack = self
            .relayer
            .notify_completion(&CompletionRequest {
                order_hash,
                resolver: self.resolver.clone(),
            })
            .await?;
        Metrics::get().slices_settled.inc();
        tracing::info!(%order_hash, status = %ack.status, "slice settled");
        Ok(Phase::Done(Outcome::Settled {
            partial_amount: funded.partial_amount,
            accepted_price: funded.accepted_price,
        }))
    }

    /// Waits for the relayer to spend the destination escrow, which puts the
    /// preimage on chain. Gives up once the source cancellation window
    /// opens, past that point settling is no longer safe.
    async fn wait_for_secret(
        &self,
        dst_chain: &Arc<dyn Chain>,
        order_hash: OrderHash,
        src_cancellation: u64,
    ) -> Result<Secret> {
        loop {
            if let Some(secret) = dst_chain.revealed_secret(order_hash).await? {
                return Ok(secret);
            }
            if dst_chain.now().await? >= src_cancellation {
                bail!("secret was not revealed before the source cancellation window");
            }
            tokio::time::sleep(self.fast_poll_interval).await;
        }
    }

    fn chain(&self, chain_id: u64) -> Result<&Arc<dyn Chain>> {
        self.chains
            .get(chain_id)
            .with_context(|| format!("no backend for chain {chain_id}"))
    }

    /// Polls faster once the price gets close to acceptable so the commit
    /// lands near the front of the race.
    fn poll_cadence(&self, current_price: U256) -> Duration {
        if self.strategy.is_approaching(current_price) {
            self.fast_poll_interval
        } else {
            self.poll_interval
        }
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "watcher")]
struct Metrics {
    /// Commitments that won their capacity race.
    commitments_won: prometheus::IntCounter,
    /// Commit attempts that found the capacity already taken.
    commitments_lost: prometheus::IntCounter,
    /// Slices carried through to settlement.
    slices_settled: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        // Always succeeds with the default registry.
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
