//! The boundary between the protocol core and concrete chains.
//!
//! Everything the relayer and resolver know about a chain goes through
//! [`Chain`]. Real backends submit transactions, [`crate::sim::SimChain`]
//! applies the same state machine to an in process ledger.

use crate::state::{EscrowError, EscrowState};
use async_trait::async_trait;
use model::{
    chain::ChainAddress,
    escrow::{EscrowId, EscrowImmutables},
    order::OrderHash,
    secret::Secret,
    timelocks::Side,
};
use primitive_types::U256;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Escrow(#[from] EscrowError),
    #[error("no escrow with this id")]
    UnknownEscrow,
    #[error("escrow with this id already exists")]
    EscrowExists,
    #[error("escrow id does not match its immutables")]
    IdMismatch,
    #[error("timelock stages are not in chronological order")]
    InvalidTimelock,
    #[error("destination escrows require the source cancellation timestamp")]
    MissingSrcCancellation,
    #[error("insufficient balance for the transfer")]
    InsufficientBalance,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Observable state of a deployed escrow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EscrowView {
    pub id: EscrowId,
    /// Immutables with the deployment timestamp stamped into the timelocks.
    pub immutables: EscrowImmutables,
    pub side: Side,
    pub state: EscrowState,
    pub principal: U256,
    pub safety: U256,
    pub src_cancellation: Option<u64>,
}

impl EscrowView {
    pub fn is_funded(&self) -> bool {
        self.principal >= self.immutables.amount
            && self.safety >= self.immutables.safety_deposit
    }
}

#[async_trait]
pub trait Chain: Send + Sync + 'static {
    fn chain_id(&self) -> u64;

    /// The chain's current timestamp in unix seconds.
    async fn now(&self) -> Result<u64, ChainError>;

    /// Creates an escrow for the given immutables. The id is derived from
    /// the immutables and returned, funds move separately through the
    /// deposit calls.
    async fn deploy_escrow(
        &self,
        immutables: EscrowImmutables,
        side: Side,
        src_cancellation: Option<u64>,
    ) -> Result<EscrowId, ChainError>;

    async fn deposit_principal(
        &self,
        escrow: EscrowId,
        from: ChainAddress,
        amount: U256,
    ) -> Result<(), ChainError>;

    async fn deposit_safety(
        &self,
        escrow: EscrowId,
        from: ChainAddress,
        amount: U256,
    ) -> Result<(), ChainError>;

    async fn withdraw(
        &self,
        escrow: EscrowId,
        caller: ChainAddress,
        secret: Secret,
    ) -> Result<(), ChainError>;

    async fn cancel(&self, escrow: EscrowId, caller: ChainAddress) -> Result<(), ChainError>;

    async fn escrow(&self, escrow: EscrowId) -> Result<Option<EscrowView>, ChainError>;

    /// The secret published by a withdrawal for this order, if any. Secrets
    /// become public knowledge the moment they are spent on chain.
    async fn revealed_secret(&self, order: OrderHash) -> Result<Option<Secret>, ChainError>;
}

/// The chains a service is connected to, keyed by chain id.
#[derive(Clone, Default)]
pub struct ChainRegistry(HashMap<u64, Arc<dyn Chain>>);

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, chain: Arc<dyn Chain>) -> Self {
        self.0.insert(chain.chain_id(), chain);
        self
    }

    pub fn get(&self, chain_id: u64) -> Option<&Arc<dyn Chain>> {
        self.0.get(&chain_id)
    }

    pub fn supports(&self, chain_id: u64) -> bool {
        self.0.contains_key(&chain_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.keys().copied()
    }
}
