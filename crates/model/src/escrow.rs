//! Escrow immutables and the deterministic identities derived from them.

use crate::{
    auction,
    chain::ChainAddress,
    order::{OrderData, OrderHash},
    timelocks::Timelocks,
    u256_decimal,
};
use primitive_types::{H256, U256};
use serde::{de, Deserialize, Serialize};
use std::{fmt, str::FromStr};
use web3::signing;

/// The parameter set an escrow is created with and that never changes
/// afterwards. Both swap parties and the relayer derive it independently,
/// which is what lets everyone precompute where funds will live.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowImmutables {
    pub order_hash: OrderHash,
    /// sha256 commitment shared by both escrows of the swap.
    pub hashlock: H256,
    /// Recipient of the locked principal on withdrawal.
    pub maker: ChainAddress,
    /// The resolver: posts the safety deposit, receives the source side
    /// principal.
    pub taker: ChainAddress,
    pub token: ChainAddress,
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    /// Native asset amount backing honest behavior.
    #[serde(with = "u256_decimal")]
    pub safety_deposit: U256,
    pub timelocks: Timelocks,
}

impl EscrowImmutables {
    /// The escrow's deterministic identity.
    ///
    /// Hashes the canonical fixed width encoding of the immutables with the
    /// deployment timestamp lanes zeroed, so the identity is computable
    /// before the escrow exists on chain.
    pub fn id(&self) -> EscrowId {
        let mut data = [0u8; 256];
        data[0..32].copy_from_slice(&self.order_hash.0);
        data[32..64].copy_from_slice(self.hashlock.as_bytes());
        data[64..96].copy_from_slice(self.maker.encoded_slot().as_bytes());
        data[96..128].copy_from_slice(self.taker.encoded_slot().as_bytes());
        data[128..160].copy_from_slice(self.token.encoded_slot().as_bytes());
        self.amount.to_big_endian(&mut data[160..192]);
        self.safety_deposit.to_big_endian(&mut data[192..224]);
        self.timelocks
            .with_deployed_at(0)
            .0
            .to_big_endian(&mut data[224..256]);
        EscrowId(H256(signing::keccak256(&data)))
    }

    /// Immutables of the source chain escrow holding a slice of the maker's
    /// principal.
    pub fn for_source(
        order_hash: OrderHash,
        order: &OrderData,
        hashlock: H256,
        resolver: ChainAddress,
        partial_amount: U256,
        per_unit_safety_deposit: U256,
        timelocks: Timelocks,
    ) -> Self {
        Self {
            order_hash,
            hashlock,
            maker: order.maker.clone(),
            taker: resolver,
            token: order.maker_asset.clone(),
            amount: partial_amount,
            safety_deposit: auction::scale(partial_amount, per_unit_safety_deposit),
            timelocks,
        }
    }

    /// Immutables of the destination chain escrow holding the resolver's
    /// taker asset payment for the same slice.
    #[allow(clippy::too_many_arguments)]
    pub fn for_destination(
        order_hash: OrderHash,
        order: &OrderData,
        hashlock: H256,
        resolver: ChainAddress,
        partial_amount: U256,
        accepted_price: U256,
        per_unit_safety_deposit: U256,
        timelocks: Timelocks,
    ) -> Self {
        Self {
            order_hash,
            hashlock,
            maker: order.beneficiary(),
            taker: resolver,
            token: order.taker_asset.clone(),
            amount: auction::scale(partial_amount, accepted_price),
            // The deposit scales with the committed slice, not with the
            // destination amount, so both escrows carry the same backing.
            safety_deposit: auction::scale(partial_amount, per_unit_safety_deposit),
            timelocks,
        }
    }
}

/// Identity of a deployed escrow on some chain.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct EscrowId(pub H256);

impl fmt::Display for EscrowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 2 + 32 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Unwrap because the length of the buffer is correct.
        hex::encode_to_slice(self.0, &mut bytes[2..]).unwrap();
        // Unwrap because hex encoding is valid utf8.
        f.write_str(std::str::from_utf8(&bytes).unwrap())
    }
}

impl fmt::Debug for EscrowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for EscrowId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(H256(bytes)))
    }
}

impl Serialize for EscrowId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EscrowId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor {}
        impl de::Visitor<'_> for Visitor {
            type Value = EscrowId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a 32 byte escrow id as a hex encoded string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                EscrowId::from_str(s).map_err(|err| {
                    de::Error::custom(format!("failed to decode escrow id {s:?}: {err}"))
                })
            }
        }
        deserializer.deserialize_str(Visitor {})
    }
}
