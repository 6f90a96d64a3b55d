//! The packed timelock word governing escrow lifecycles.
//!
//! Seven relative stage offsets travel in one 256 bit word, each occupying
//! 32 bits, with the deployment timestamp stamped into the top 32 bits by
//! the chain when the escrow is created. All stage deadlines are therefore
//! relative to deployment, not to order creation.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bit offset of the deployment timestamp within the packed word.
pub const DEPLOYED_AT_OFFSET: usize = 224;

/// Lifecycle checkpoints of an escrow pair, in packing order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Stage {
    SrcWithdrawal = 0,
    SrcPublicWithdrawal = 1,
    SrcCancellation = 2,
    SrcPublicCancellation = 3,
    DstWithdrawal = 4,
    DstPublicWithdrawal = 5,
    DstCancellation = 6,
}

/// Which chain of the swap an escrow lives on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Src,
    Dst,
}

impl Side {
    /// The stages applying to escrows of this side, in chronological order.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Self::Src => &[
                Stage::SrcWithdrawal,
                Stage::SrcPublicWithdrawal,
                Stage::SrcCancellation,
                Stage::SrcPublicCancellation,
            ],
            Self::Dst => &[
                Stage::DstWithdrawal,
                Stage::DstPublicWithdrawal,
                Stage::DstCancellation,
            ],
        }
    }

    pub fn withdrawal(&self) -> Stage {
        match self {
            Self::Src => Stage::SrcWithdrawal,
            Self::Dst => Stage::DstWithdrawal,
        }
    }

    pub fn public_withdrawal(&self) -> Stage {
        match self {
            Self::Src => Stage::SrcPublicWithdrawal,
            Self::Dst => Stage::DstPublicWithdrawal,
        }
    }

    pub fn cancellation(&self) -> Stage {
        match self {
            Self::Src => Stage::SrcCancellation,
            Self::Dst => Stage::DstCancellation,
        }
    }

    /// Destination escrows have no public cancellation stage. Once the
    /// source side cancelled, private cancellation is already permissionless
    /// enough because the depositor is the only party with funds at risk.
    pub fn public_cancellation(&self) -> Option<Stage> {
        match self {
            Self::Src => Some(Stage::SrcPublicCancellation),
            Self::Dst => None,
        }
    }
}

/// Stage offsets in seconds from escrow deployment.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Durations {
    pub src_withdrawal: u32,
    pub src_public_withdrawal: u32,
    pub src_cancellation: u32,
    pub src_public_cancellation: u32,
    pub dst_withdrawal: u32,
    pub dst_public_withdrawal: u32,
    pub dst_cancellation: u32,
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            src_withdrawal: 0,
            src_public_withdrawal: 900,
            src_cancellation: 1800,
            src_public_cancellation: 3600,
            dst_withdrawal: 0,
            dst_public_withdrawal: 900,
            dst_cancellation: 2700,
        }
    }
}

impl Durations {
    pub fn as_array(&self) -> [u32; 7] {
        [
            self.src_withdrawal,
            self.src_public_withdrawal,
            self.src_cancellation,
            self.src_public_cancellation,
            self.dst_withdrawal,
            self.dst_public_withdrawal,
            self.dst_cancellation,
        ]
    }

    pub fn from_array(offsets: [u32; 7]) -> Self {
        Self {
            src_withdrawal: offsets[0],
            src_public_withdrawal: offsets[1],
            src_cancellation: offsets[2],
            src_public_cancellation: offsets[3],
            dst_withdrawal: offsets[4],
            dst_public_withdrawal: offsets[5],
            dst_cancellation: offsets[6],
        }
    }

    /// Whether each side's stages are in non decreasing order. Escrows with
    /// unordered schedules must never be deployed because their windows
    /// would overlap in contradictory ways.
    pub fn is_ordered(&self) -> bool {
        self.src_withdrawal <= self.src_public_withdrawal
            && self.src_public_withdrawal <= self.src_cancellation
            && self.src_cancellation <= self.src_public_cancellation
            && self.dst_withdrawal <= self.dst_public_withdrawal
            && self.dst_public_withdrawal <= self.dst_cancellation
    }

    pub fn pack(&self) -> Timelocks {
        let mut word = U256::zero();
        for (index, offset) in self.as_array().into_iter().enumerate() {
            word |= U256::from(offset) << (32 * index);
        }
        Timelocks(word)
    }
}

/// The packed word as it appears in escrow immutables.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Timelocks(#[serde(with = "crate::u256_decimal")] pub U256);

impl Timelocks {
    /// Relative offset of a stage in seconds from deployment.
    pub fn offset(&self, stage: Stage) -> u32 {
        (self.0 >> (32 * stage as usize)).low_u32()
    }

    /// The deployment timestamp currently stamped into the word, zero for
    /// words that have not been deployed yet.
    pub fn deployed_at(&self) -> u64 {
        (self.0 >> DEPLOYED_AT_OFFSET).low_u64()
    }

    /// Returns the word with the deployment timestamp replaced.
    ///
    /// Timestamps are stored as 32 bits of unix seconds which keeps them
    /// valid until 2106.
    pub fn with_deployed_at(self, deployed_at: u64) -> Self {
        let mut word = self.0;
        word &= !(U256::from(u32::MAX) << DEPLOYED_AT_OFFSET);
        word |= U256::from(deployed_at as u32) << DEPLOYED_AT_OFFSET;
        Self(word)
    }

    /// Absolute unix timestamp at which a stage opens.
    pub fn deadline(&self, stage: Stage) -> u64 {
        self.deployed_at() + self.offset(stage) as u64
    }

    /// The most advanced stage of `side` whose deadline has passed, if any.
    pub fn current_stage(&self, side: Side, now: u64) -> Option<Stage> {
        side.stages()
            .iter()
            .copied()
            .rev()
            .find(|stage| now >= self.deadline(*stage))
    }

    pub fn durations(&self) -> Durations {
        let mut offsets = [0u32; 7];
        for (index, offset) in offsets.iter_mut().enumerate() {
            *offset = (self.0 >> (32 * index)).low_u32();
        }
        Durations::from_array(offsets)
    }
}

impl fmt::Debug for Timelocks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Timelocks")
            .field("deployed_at", &self.deployed_at())
            .field("offsets", &self.durations().as_array())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Durations {
        Durations::from_array([10, 120, 240, 480, 15, 100, 200])
    }

    #[test]
    fn pack_unpack_roundtrip() {
        assert_eq!(schedule().pack().durations(), schedule());
        assert_eq!(Durations::default().pack().durations(), Durations::default());
    }

    #[test]
    fn packing_uses_32_bit_lanes() {
        let word = schedule().pack();
        let expected = U256::from(10u32)
            | U256::from(120u32) << 32
            | U256::from(240u32) << 64
            | U256::from(480u32) << 96
            | U256::from(15u32) << 128
            | U256::from(100u32) << 160
            | U256::from(200u32) << 192;
        assert_eq!(word.0, expected);
    }

    #[test]
    fn deployment_stamp_preserves_offsets() {
        let stamped = schedule().pack().with_deployed_at(1_700_000_000);
        assert_eq!(stamped.deployed_at(), 1_700_000_000);
        assert_eq!(stamped.durations(), schedule());
    }

    #[test]
    fn restamping_replaces_previous_timestamp() {
        let stamped = schedule()
            .pack()
            .with_deployed_at(u32::MAX as u64)
            .with_deployed_at(1_700_000_123);
        assert_eq!(stamped.deployed_at(), 1_700_000_123);
        assert_eq!(stamped.durations(), schedule());
    }

    #[test]
    fn stage_deadlines_are_relative_to_deployment() {
        let stamped = schedule().pack().with_deployed_at(1_000);
        assert_eq!(stamped.deadline(Stage::SrcWithdrawal), 1_010);
        assert_eq!(stamped.deadline(Stage::SrcPublicCancellation), 1_480);
        assert_eq!(stamped.deadline(Stage::DstCancellation), 1_200);
    }

    #[test]
    fn current_stage_progression() {
        let stamped = schedule().pack().with_deployed_at(1_000);
        assert_eq!(stamped.current_stage(Side::Src, 1_005), None);
        assert_eq!(
            stamped.current_stage(Side::Src, 1_010),
            Some(Stage::SrcWithdrawal),
        );
        assert_eq!(
            stamped.current_stage(Side::Src, 1_130),
            Some(Stage::SrcPublicWithdrawal),
        );
        assert_eq!(
            stamped.current_stage(Side::Src, 100_000),
            Some(Stage::SrcPublicCancellation),
        );
        assert_eq!(
            stamped.current_stage(Side::Dst, 1_120),
            Some(Stage::DstPublicWithdrawal),
        );
    }

    #[test]
    fn ordering_validation() {
        assert!(Durations::default().is_ordered());
        assert!(schedule().is_ordered());
        let unordered = Durations {
            src_cancellation: 60,
            src_public_withdrawal: 120,
            ..Durations::default()
        };
        assert!(!unordered.is_ordered());
        let dst_unordered = Durations {
            dst_cancellation: 0,
            dst_public_withdrawal: 900,
            ..Durations::default()
        };
        assert!(!dst_unordered.is_ordered());
    }
}
