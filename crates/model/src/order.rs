//! The signed cross chain order and its canonical hash.

use crate::{
    auction::AuctionParams,
    chain::ChainAddress,
    secret::Secret,
    signature::{self, EcdsaSigningScheme, Signature},
    u256_decimal, DomainSeparator,
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use primitive_types::{H160, H256, U256};
use secp256k1::SecretKey;
use serde::{de, Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use web3::signing;

/// Where an order stands in the coordination flow.
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
pub enum OrderStatus {
    #[default]
    Broadcasted,
    Committed,
    EscrowsReady,
    UserFundsTransferred,
    Completed,
    RescueAvailable,
    Expired,
}

impl OrderStatus {
    /// Whether new commitments may still claim capacity of the order.
    pub fn is_committable(&self) -> bool {
        matches!(self, Self::Broadcasted | Self::Committed | Self::RescueAvailable)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

/// The fields a maker signs. Every participant derives the same hash from
/// them, which is the identity used across the coordination API, the
/// database and the escrows on both chains.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    #[serde(with = "u256_decimal")]
    pub salt: U256,
    pub maker: ChainAddress,
    /// Recipient of the taker asset, all zero means the maker itself.
    pub receiver: ChainAddress,
    pub maker_asset: ChainAddress,
    pub taker_asset: ChainAddress,
    #[serde(with = "u256_decimal")]
    pub making_amount: U256,
    #[serde(with = "u256_decimal")]
    pub taking_amount: U256,
    /// Unix seconds after which the order is no longer fillable.
    pub deadline: u64,
    #[serde(with = "u256_decimal")]
    pub nonce: U256,
    pub src_chain_id: u64,
    pub dst_chain_id: u64,
    pub auction_start_time: u64,
    pub auction_end_time: u64,
    #[serde(with = "u256_decimal")]
    pub start_price: U256,
    #[serde(with = "u256_decimal")]
    pub end_price: U256,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    #[error("timelock stages are not in chronological order")]
    InvalidTimelock,
    #[error("auction window starts after it ends")]
    InvalidAuctionWindow,
    #[error("order deadline has passed")]
    OrderExpired,
    #[error("order amount is zero")]
    ZeroAmount,
    #[error("maker address family does not support ecdsa signatures")]
    UnsupportedSigner,
    #[error("signature is malformed")]
    InvalidSignature,
    #[error("signature recovers to {0:?} instead of the maker")]
    WrongSigner(H160),
}

impl OrderData {
    /// Keccak hash of the abi encoded order struct as defined by the
    /// settlement domain's canonical order type.
    pub fn hash_struct(&self) -> [u8; 32] {
        lazy_static! {
            static ref ORDER_TYPE_HASH: [u8; 32] = signing::keccak256(
                b"Order(uint256 salt,address maker,address receiver,address makerAsset,\
                  address takerAsset,uint256 makingAmount,uint256 takingAmount,\
                  uint256 deadline,uint256 nonce,uint256 srcChainId,uint256 dstChainId,\
                  uint256 auctionStartTime,uint256 auctionEndTime,uint256 startPrice,\
                  uint256 endPrice)",
            );
        }
        let mut hash_data = [0u8; 512];
        hash_data[0..32].copy_from_slice(&*ORDER_TYPE_HASH);
        self.salt.to_big_endian(&mut hash_data[32..64]);
        hash_data[64..96].copy_from_slice(self.maker.encoded_slot().as_bytes());
        hash_data[96..128].copy_from_slice(self.receiver.encoded_slot().as_bytes());
        hash_data[128..160].copy_from_slice(self.maker_asset.encoded_slot().as_bytes());
        hash_data[160..192].copy_from_slice(self.taker_asset.encoded_slot().as_bytes());
        self.making_amount.to_big_endian(&mut hash_data[192..224]);
        self.taking_amount.to_big_endian(&mut hash_data[224..256]);
        U256::from(self.deadline).to_big_endian(&mut hash_data[256..288]);
        self.nonce.to_big_endian(&mut hash_data[288..320]);
        U256::from(self.src_chain_id).to_big_endian(&mut hash_data[320..352]);
        U256::from(self.dst_chain_id).to_big_endian(&mut hash_data[352..384]);
        U256::from(self.auction_start_time).to_big_endian(&mut hash_data[384..416]);
        U256::from(self.auction_end_time).to_big_endian(&mut hash_data[416..448]);
        self.start_price.to_big_endian(&mut hash_data[448..480]);
        self.end_price.to_big_endian(&mut hash_data[480..512]);
        signing::keccak256(&hash_data)
    }

    /// The EIP-712 order hash under the source chain's signing domain.
    pub fn hash(&self, domain_separator: &DomainSeparator) -> OrderHash {
        OrderHash(signature::hashed_eip712_message(
            domain_separator,
            &self.hash_struct(),
        ))
    }

    /// Orders are signed under the domain of their source chain.
    pub fn domain(&self, verifying_contract: H160) -> DomainSeparator {
        DomainSeparator::new(self.src_chain_id, verifying_contract)
    }

    pub fn auction(&self) -> AuctionParams {
        AuctionParams {
            start_time: self.auction_start_time,
            end_time: self.auction_end_time,
            start_price: self.start_price,
            end_price: self.end_price,
        }
    }

    /// Who receives the taker asset on the destination chain.
    pub fn beneficiary(&self) -> ChainAddress {
        if self.receiver.is_zero() {
            self.maker.clone()
        } else {
            self.receiver.clone()
        }
    }

    pub fn validate(&self, now: u64) -> Result<(), ValidationError> {
        if self.making_amount.is_zero() {
            return Err(ValidationError::ZeroAmount);
        }
        if !self.auction().is_valid_window() {
            return Err(ValidationError::InvalidAuctionWindow);
        }
        if now > self.deadline {
            return Err(ValidationError::OrderExpired);
        }
        Ok(())
    }
}

/// EIP-712 hash identifying an order.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct OrderHash(pub [u8; 32]);

impl fmt::Display for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 2 + 32 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Unwrap because the length of the buffer is correct.
        hex::encode_to_slice(self.0, &mut bytes[2..]).unwrap();
        // Unwrap because hex encoding is valid utf8.
        f.write_str(std::str::from_utf8(&bytes).unwrap())
    }
}

impl fmt::Debug for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for OrderHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for OrderHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor {}
        impl de::Visitor<'_> for Visitor {
            type Value = OrderHash;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a 32 byte order hash as a hex encoded string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                OrderHash::from_str(s).map_err(|err| {
                    de::Error::custom(format!("failed to decode order hash {s:?}: {err}"))
                })
            }
        }
        deserializer.deserialize_str(Visitor {})
    }
}

/// What a maker submits to open a swap.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreation {
    #[serde(flatten)]
    pub data: OrderData,
    /// The preimage held in custody by the relayer until both escrows are
    /// funded.
    pub secret: Secret,
    #[serde(flatten)]
    pub signature: Signature,
}

impl OrderCreation {
    /// Checks that the signature recovers to the maker and returns the
    /// recovered address.
    pub fn verify_signature(
        &self,
        domain_separator: &DomainSeparator,
    ) -> Result<H160, ValidationError> {
        let maker = self
            .data
            .maker
            .evm()
            .ok_or(ValidationError::UnsupportedSigner)?;
        let recovered = self
            .signature
            .recover(domain_separator, &self.data.hash_struct())
            .ok_or(ValidationError::InvalidSignature)?;
        if recovered != maker {
            return Err(ValidationError::WrongSigner(recovered));
        }
        Ok(recovered)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub order_hash: OrderHash,
    pub status: OrderStatus,
    pub creation_date: DateTime<Utc>,
    /// sha256 commitment to the swap secret.
    pub hashlock: H256,
    #[serde(with = "u256_decimal")]
    pub filled_amount: U256,
    pub secret_revealed_at: Option<DateTime<Utc>>,
}

impl Default for OrderMetadata {
    fn default() -> Self {
        Self {
            order_hash: Default::default(),
            status: Default::default(),
            creation_date: DateTime::UNIX_EPOCH,
            hashlock: Default::default(),
            filled_amount: Default::default(),
            secret_revealed_at: None,
        }
    }
}

/// An order as served by the coordination API.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(flatten)]
    pub metadata: OrderMetadata,
    #[serde(flatten)]
    pub data: OrderData,
    #[serde(flatten)]
    pub signature: Signature,
}

impl Order {
    pub fn remaining_amount(&self) -> U256 {
        self.data
            .making_amount
            .saturating_sub(self.metadata.filled_amount)
    }
}

#[derive(Default)]
pub struct OrderBuilder(Order);

impl OrderBuilder {
    pub fn with_salt(mut self, salt: U256) -> Self {
        self.0.data.salt = salt;
        self
    }

    pub fn with_maker(mut self, maker: ChainAddress) -> Self {
        self.0.data.maker = maker;
        self
    }

    pub fn with_receiver(mut self, receiver: ChainAddress) -> Self {
        self.0.data.receiver = receiver;
        self
    }

    pub fn with_maker_asset(mut self, asset: ChainAddress) -> Self {
        self.0.data.maker_asset = asset;
        self
    }

    pub fn with_taker_asset(mut self, asset: ChainAddress) -> Self {
        self.0.data.taker_asset = asset;
        self
    }

    pub fn with_making_amount(mut self, amount: U256) -> Self {
        self.0.data.making_amount = amount;
        self
    }

    pub fn with_taking_amount(mut self, amount: U256) -> Self {
        self.0.data.taking_amount = amount;
        self
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.0.data.deadline = deadline;
        self
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.0.data.nonce = nonce;
        self
    }

    pub fn with_chains(mut self, src: u64, dst: u64) -> Self {
        self.0.data.src_chain_id = src;
        self.0.data.dst_chain_id = dst;
        self
    }

    pub fn with_auction(mut self, auction: AuctionParams) -> Self {
        self.0.data.auction_start_time = auction.start_time;
        self.0.data.auction_end_time = auction.end_time;
        self.0.data.start_price = auction.start_price;
        self.0.data.end_price = auction.end_price;
        self
    }

    pub fn with_creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.0.metadata.creation_date = creation_date;
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.0.metadata.status = status;
        self
    }

    pub fn with_secret(mut self, secret: &Secret) -> Self {
        self.0.metadata.hashlock = secret.hashlock();
        self
    }

    /// Sets the maker to the key's address, signs the order and stores the
    /// resulting hash in the metadata.
    pub fn sign_with(
        mut self,
        scheme: EcdsaSigningScheme,
        domain_separator: &DomainSeparator,
        key: &SecretKey,
    ) -> Self {
        self.0.data.maker = ChainAddress::Evm(signature::public_address(key));
        self.0.metadata.order_hash = self.0.data.hash(domain_separator);
        self.0.signature = Signature::from_ecdsa(
            scheme,
            crate::signature::EcdsaSignature::sign(
                scheme,
                domain_separator,
                &self.0.data.hash_struct(),
                key,
            ),
        );
        self
    }

    pub fn build(self) -> Order {
        self.0
    }
}
