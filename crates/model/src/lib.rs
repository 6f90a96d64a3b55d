//! Contains the order swap model and references to the chain-specific
//! address formats the protocol settles across.

pub mod api;
pub mod auction;
pub mod bytes_hex;
pub mod chain;
pub mod commitment;
pub mod escrow;
pub mod order;
pub mod secret;
pub mod signature;
pub mod timelocks;
pub mod u256_decimal;

use hex::{FromHex, FromHexError};
use lazy_static::lazy_static;
use primitive_types::H160;
use std::fmt;
use web3::{
    ethabi::{encode, Token},
    signing,
};

/// Erc20 EIP-712 domain separator for the protocol's limit order domain.
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct DomainSeparator(pub [u8; 32]);

impl std::str::FromStr for DomainSeparator {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DomainSeparator(FromHex::from_hex(s)?))
    }
}

impl fmt::Debug for DomainSeparator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut hex = [0u8; 64];
        // Unwrap because the length is always correct.
        hex::encode_to_slice(self.0, &mut hex).unwrap();
        // Unwrap because the string is always valid utf8.
        let str = std::str::from_utf8(&hex).unwrap();
        f.write_str(str)
    }
}

impl DomainSeparator {
    pub fn new(chain_id: u64, contract_address: H160) -> Self {
        lazy_static! {
            /// The EIP-712 domain name used for computing the domain separator.
            static ref DOMAIN_NAME: [u8; 32] = signing::keccak256(b"UniteLimitOrderProtocol");

            /// The EIP-712 domain version used for computing the domain separator.
            static ref DOMAIN_VERSION: [u8; 32] = signing::keccak256(b"1");

            /// The EIP-712 domain type used for computing the domain separator.
            static ref DOMAIN_TYPE_HASH: [u8; 32] = signing::keccak256(
                b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
            );
        }
        let abi_encode_string = encode(&[
            Token::Uint((*DOMAIN_TYPE_HASH).into()),
            Token::Uint((*DOMAIN_NAME).into()),
            Token::Uint((*DOMAIN_VERSION).into()),
            Token::Uint(chain_id.into()),
            Token::Address(contract_address),
        ]);

        DomainSeparator(signing::keccak256(abi_encode_string.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn domain_separator_is_deterministic() {
        let contract = H160([0x42; 20]);
        assert_eq!(
            DomainSeparator::new(8453, contract),
            DomainSeparator::new(8453, contract),
        );
    }

    #[test]
    fn domain_separator_changes_with_chain_and_contract() {
        let contract = H160([0x42; 20]);
        let base = DomainSeparator::new(1, contract);
        assert_ne!(base, DomainSeparator::new(100, contract));
        assert_ne!(base, DomainSeparator::new(1, H160([0x43; 20])));
    }

    #[test]
    fn domain_separator_from_str() {
        let hex = "f8a1eb196452e4b3e08a35e60ca1981caed5f54d7e18ff4dcda6c42f268b7464";
        let parsed = DomainSeparator::from_str(hex).unwrap();
        assert_eq!(format!("{parsed:?}"), hex);
    }
}
