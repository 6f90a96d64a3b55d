//! Account identities across the chain families the protocol settles on.

use primitive_types::{H160, H256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use web3::signing;

/// An account, contract or locking script on some chain.
///
/// Orders commit to addresses through a fixed 32 byte slot so that one hash
/// covers every supported chain family, see [`ChainAddress::encoded_slot`].
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainAddress {
    /// 20 byte account model address.
    Evm(H160),
    /// 32 byte object or resource account address.
    Move(H256),
    /// Locking script of an output based chain.
    Utxo(#[serde(with = "crate::bytes_hex")] Vec<u8>),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum AddressCodecError {
    #[error("upper 12 bytes of an evm address slot must be zero")]
    DirtyUpperBytes,
}

impl ChainAddress {
    /// The canonical 32 byte form hashed into orders and escrow identities.
    ///
    /// Evm addresses are left padded with zeros, Move addresses are used as
    /// is and scripts too long to inline are represented by their digest.
    pub fn encoded_slot(&self) -> H256 {
        match self {
            Self::Evm(address) => {
                let mut slot = [0u8; 32];
                slot[12..].copy_from_slice(address.as_bytes());
                H256(slot)
            }
            Self::Move(address) => *address,
            Self::Utxo(script) => H256(signing::keccak256(script)),
        }
    }

    /// Recovers an Evm address from its padded slot.
    pub fn from_evm_slot(slot: H256) -> Result<Self, AddressCodecError> {
        if slot.as_bytes()[..12].iter().any(|byte| *byte != 0) {
            return Err(AddressCodecError::DirtyUpperBytes);
        }
        Ok(Self::Evm(H160::from_slice(&slot.as_bytes()[12..])))
    }

    pub fn evm(&self) -> Option<H160> {
        match self {
            Self::Evm(address) => Some(*address),
            _ => None,
        }
    }

    /// Whether this is the all zero address of its chain family, used as the
    /// "no explicit receiver" marker in orders.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Evm(address) => address.is_zero(),
            Self::Move(address) => address.is_zero(),
            Self::Utxo(script) => script.is_empty(),
        }
    }
}

impl Default for ChainAddress {
    fn default() -> Self {
        Self::Evm(H160::zero())
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Evm(address) => write!(f, "evm:{address:?}"),
            Self::Move(address) => write!(f, "move:{address:?}"),
            Self::Utxo(script) => write!(f, "utxo:0x{}", hex::encode(script)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evm_slot_roundtrip() {
        let address = ChainAddress::Evm(H160([0x11; 20]));
        let slot = address.encoded_slot();
        assert_eq!(slot.as_bytes()[..12], [0u8; 12]);
        assert_eq!(ChainAddress::from_evm_slot(slot), Ok(address));
    }

    #[test]
    fn dirty_evm_slot_is_rejected() {
        let mut slot = [0u8; 32];
        slot[0] = 1;
        slot[31] = 1;
        assert_eq!(
            ChainAddress::from_evm_slot(H256(slot)),
            Err(AddressCodecError::DirtyUpperBytes),
        );
    }

    #[test]
    fn move_slot_is_identity() {
        let address = H256([0x22; 32]);
        assert_eq!(ChainAddress::Move(address).encoded_slot(), address);
    }

    #[test]
    fn utxo_slot_is_script_digest() {
        let script = ChainAddress::Utxo(vec![0x51, 0x21, 0x03]);
        let other = ChainAddress::Utxo(vec![0x51, 0x21, 0x04]);
        assert_eq!(script.encoded_slot(), script.encoded_slot());
        assert_ne!(script.encoded_slot(), other.encoded_slot());
    }

    #[test]
    fn zero_detection() {
        assert!(ChainAddress::Evm(H160::zero()).is_zero());
        assert!(!ChainAddress::Evm(H160([1; 20])).is_zero());
        assert!(ChainAddress::Move(H256::zero()).is_zero());
        assert!(ChainAddress::Utxo(Vec::new()).is_zero());
    }

    #[test]
    fn serialization() {
        let address = ChainAddress::Evm(H160([0x01; 20]));
        assert_eq!(
            serde_json::to_value(&address).unwrap(),
            json!({ "evm": "0x0101010101010101010101010101010101010101" }),
        );
        let script = ChainAddress::Utxo(vec![0xab, 0xcd]);
        assert_eq!(
            serde_json::to_value(&script).unwrap(),
            json!({ "utxo": "0xabcd" }),
        );
        let roundtrip: ChainAddress =
            serde_json::from_value(serde_json::to_value(&script).unwrap()).unwrap();
        assert_eq!(roundtrip, script);
    }
}
