//! Resolver commitments to fill order capacity.

use crate::{auction, chain::ChainAddress, escrow::EscrowId, order::OrderHash, u256_decimal};
use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CommitmentState {
    /// Capacity reserved, escrows not proven yet. The safety deposit backs
    /// the promise until the commitment deadline.
    #[default]
    Pending,
    /// Both escrows verified on chain.
    EscrowsReady,
    Completed,
    /// The commitment deadline elapsed without escrows, the deposit is
    /// forfeit and the capacity is available again.
    Slashable,
}

impl CommitmentState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::EscrowsReady)
    }
}

/// A resolver's claim on a slice of an order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub order_hash: OrderHash,
    pub resolver: ChainAddress,
    /// Maker asset amount the resolver committed to fill.
    #[serde(with = "u256_decimal")]
    pub partial_amount: U256,
    /// Auction price locked in at commit time, 18 decimal fixed point.
    #[serde(with = "u256_decimal")]
    pub accepted_price: U256,
    /// Deposit backing the commitment, forfeited when it goes slashable.
    #[serde(with = "u256_decimal")]
    pub safety_deposit: U256,
    /// When the commitment becomes slashable unless escrows are ready.
    pub deadline: DateTime<Utc>,
    pub state: CommitmentState,
    pub src_escrow: Option<EscrowId>,
    pub dst_escrow: Option<EscrowId>,
}

impl Commitment {
    /// Taker asset owed for the committed slice at the accepted price.
    pub fn taking_amount(&self) -> U256 {
        auction::scale(self.partial_amount, self.accepted_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn taking_amount_uses_accepted_price() {
        let commitment = Commitment {
            order_hash: Default::default(),
            resolver: Default::default(),
            partial_amount: 60_000_000_000_000_000_000u128.into(),
            accepted_price: 1_010_000_000_000_000_000u128.into(),
            safety_deposit: Default::default(),
            deadline: DateTime::UNIX_EPOCH,
            state: Default::default(),
            src_escrow: None,
            dst_escrow: None,
        };
        assert_eq!(
            commitment.taking_amount(),
            U256::from(60_600_000_000_000_000_000u128),
        );
    }

    #[test]
    fn state_strings_and_liveness() {
        assert_eq!(CommitmentState::EscrowsReady.to_string(), "escrowsReady");
        assert_eq!(
            CommitmentState::from_str("slashable").unwrap(),
            CommitmentState::Slashable,
        );
        assert!(CommitmentState::Pending.is_live());
        assert!(CommitmentState::EscrowsReady.is_live());
        assert!(!CommitmentState::Slashable.is_live());
        assert!(!CommitmentState::Completed.is_live());
    }
}
