use crate::DomainSeparator;
use lazy_static::lazy_static;
use primitive_types::{H160, H256};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{de, Deserialize, Serialize};
use std::fmt;
use web3::signing;

lazy_static! {
    static ref SECP: Secp256k1<All> = Secp256k1::new();
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcdsaSigningScheme {
    Eip712,
    EthSign,
}

/// An order signature together with the scheme the maker used.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase", tag = "signingScheme", content = "signature")]
pub enum Signature {
    Eip712(EcdsaSignature),
    EthSign(EcdsaSignature),
}

impl Default for Signature {
    fn default() -> Self {
        Self::Eip712(Default::default())
    }
}

impl Signature {
    pub fn from_ecdsa(scheme: EcdsaSigningScheme, signature: EcdsaSignature) -> Self {
        match scheme {
            EcdsaSigningScheme::Eip712 => Self::Eip712(signature),
            EcdsaSigningScheme::EthSign => Self::EthSign(signature),
        }
    }

    pub fn scheme(&self) -> EcdsaSigningScheme {
        match self {
            Self::Eip712(_) => EcdsaSigningScheme::Eip712,
            Self::EthSign(_) => EcdsaSigningScheme::EthSign,
        }
    }

    pub fn ecdsa(&self) -> &EcdsaSignature {
        match self {
            Self::Eip712(signature) | Self::EthSign(signature) => signature,
        }
    }

    /// Recovers the address of the signer, `None` for malformed signatures.
    pub fn recover(
        &self,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
    ) -> Option<H160> {
        self.ecdsa()
            .recover(self.scheme(), domain_separator, struct_hash)
    }

    pub fn to_bytes(self) -> [u8; 65] {
        self.ecdsa().to_bytes()
    }
}

/// The hash a maker's wallet signs for an EIP-712 typed data request.
pub fn hashed_eip712_message(
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    let mut message = [0u8; 66];
    message[0..2].copy_from_slice(&[0x19, 0x01]);
    message[2..34].copy_from_slice(&domain_separator.0);
    message[34..66].copy_from_slice(struct_hash);
    signing::keccak256(&message)
}

fn hashed_ethsign_message(
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    let mut message = [0u8; 60];
    message[0..28].copy_from_slice(b"\x19Ethereum Signed Message:\n32");
    message[28..60].copy_from_slice(&hashed_eip712_message(domain_separator, struct_hash));
    signing::keccak256(&message)
}

fn hashed_signing_message(
    scheme: EcdsaSigningScheme,
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    match scheme {
        EcdsaSigningScheme::Eip712 => hashed_eip712_message(domain_separator, struct_hash),
        EcdsaSigningScheme::EthSign => hashed_ethsign_message(domain_separator, struct_hash),
    }
}

/// The address belonging to a secp256k1 private key.
pub fn public_address(key: &SecretKey) -> H160 {
    let public = PublicKey::from_secret_key(&SECP, key);
    let hash = signing::keccak256(&public.serialize_uncompressed()[1..]);
    H160::from_slice(&hash[12..])
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct EcdsaSignature {
    pub r: H256,
    pub s: H256,
    pub v: u8,
}

impl EcdsaSignature {
    /// r + s + v
    pub fn to_bytes(self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(self.r.as_bytes());
        bytes[32..64].copy_from_slice(self.s.as_bytes());
        bytes[64] = self.v;
        bytes
    }

    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        EcdsaSignature {
            r: H256::from_slice(&bytes[..32]),
            s: H256::from_slice(&bytes[32..64]),
            v: bytes[64],
        }
    }

    /// Recovers the address of the signer, `None` for signatures with an
    /// invalid recovery id or that do not recover to any key.
    pub fn recover(
        &self,
        scheme: EcdsaSigningScheme,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
    ) -> Option<H160> {
        let message = hashed_signing_message(scheme, domain_separator, struct_hash);
        let recovery_id = match self.v {
            27 | 28 => (self.v - 27) as i32,
            v @ (0 | 1) => v as i32,
            _ => return None,
        };
        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(self.r.as_bytes());
        signature[32..].copy_from_slice(self.s.as_bytes());
        signing::recover(&message, &signature, recovery_id).ok()
    }

    pub fn sign(
        scheme: EcdsaSigningScheme,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
        key: &SecretKey,
    ) -> Self {
        let message = hashed_signing_message(scheme, domain_separator, struct_hash);
        // Unwrap because the message is always a 32 byte hash.
        let message = Message::from_slice(&message).unwrap();
        let (recovery_id, data) = SECP
            .sign_ecdsa_recoverable(&message, key)
            .serialize_compact();
        Self {
            r: H256::from_slice(&data[..32]),
            s: H256::from_slice(&data[32..]),
            v: recovery_id.to_i32() as u8 + 27,
        }
    }
}

impl Serialize for EcdsaSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut bytes = [0u8; 2 + 65 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Can only fail if the buffer size does not match which we know not
        // to be the case.
        hex::encode_to_slice(self.to_bytes(), &mut bytes[2..]).unwrap();
        // Hex encoding is always valid utf8.
        let str = std::str::from_utf8(&bytes).unwrap();
        serializer.serialize_str(str)
    }
}

impl<'de> Deserialize<'de> for EcdsaSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor {}
        impl de::Visitor<'_> for Visitor {
            type Value = EcdsaSignature;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    f,
                    "the 65 ecdsa signature bytes as a hex encoded string starting with 0x"
                )
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let s = s.strip_prefix("0x").ok_or_else(|| {
                    de::Error::custom(format!(
                        "failed to decode signature {s:?}: missing \"0x\" prefix"
                    ))
                })?;
                let mut bytes = [0u8; 65];
                hex::decode_to_slice(s, &mut bytes).map_err(|err| {
                    de::Error::custom(format!("failed to decode signature {s:?}: {err}"))
                })?;
                Ok(EcdsaSignature::from_bytes(&bytes))
            }
        }
        deserializer.deserialize_str(Visitor {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(fill: u8) -> SecretKey {
        SecretKey::from_slice(&[fill; 32]).unwrap()
    }

    #[test]
    fn signing_recovers_to_signer() {
        let domain_separator = DomainSeparator([0x11; 32]);
        let struct_hash = [0x22; 32];
        for scheme in [EcdsaSigningScheme::Eip712, EcdsaSigningScheme::EthSign] {
            let signature =
                EcdsaSignature::sign(scheme, &domain_separator, &struct_hash, &key(1));
            assert_eq!(
                signature.recover(scheme, &domain_separator, &struct_hash),
                Some(public_address(&key(1))),
            );
        }
    }

    #[test]
    fn recovery_is_message_sensitive() {
        let domain_separator = DomainSeparator([0x11; 32]);
        let signature = EcdsaSignature::sign(
            EcdsaSigningScheme::Eip712,
            &domain_separator,
            &[0x22; 32],
            &key(1),
        );
        let recovered = signature.recover(
            EcdsaSigningScheme::Eip712,
            &domain_separator,
            &[0x23; 32],
        );
        assert_ne!(recovered, Some(public_address(&key(1))));
    }

    #[test]
    fn schemes_produce_distinct_messages() {
        let domain_separator = DomainSeparator([0x11; 32]);
        let struct_hash = [0x22; 32];
        assert_ne!(
            hashed_eip712_message(&domain_separator, &struct_hash),
            hashed_ethsign_message(&domain_separator, &struct_hash),
        );
    }

    #[test]
    fn invalid_recovery_id_is_rejected() {
        let signature = EcdsaSignature {
            r: H256([1; 32]),
            s: H256([2; 32]),
            v: 5,
        };
        assert_eq!(
            signature.recover(
                EcdsaSigningScheme::Eip712,
                &DomainSeparator::default(),
                &[0; 32],
            ),
            None,
        );
    }

    #[test]
    fn normalizes_both_v_conventions() {
        let domain_separator = DomainSeparator([0x33; 32]);
        let struct_hash = [0x44; 32];
        let mut signature = EcdsaSignature::sign(
            EcdsaSigningScheme::Eip712,
            &domain_separator,
            &struct_hash,
            &key(2),
        );
        let expected = Some(public_address(&key(2)));
        assert_eq!(
            signature.recover(EcdsaSigningScheme::Eip712, &domain_separator, &struct_hash),
            expected,
        );
        signature.v -= 27;
        assert_eq!(
            signature.recover(EcdsaSigningScheme::Eip712, &domain_separator, &struct_hash),
            expected,
        );
    }

    #[test]
    fn bytes_roundtrip() {
        let signature = EcdsaSignature {
            r: H256([1; 32]),
            s: H256([2; 32]),
            v: 27,
        };
        assert_eq!(EcdsaSignature::from_bytes(&signature.to_bytes()), signature);
    }

    #[test]
    fn json_representation() {
        let signature = Signature::Eip712(EcdsaSignature {
            r: H256([0x11; 32]),
            s: H256([0x22; 32]),
            v: 27,
        });
        let expected = json!({
            "signingScheme": "eip712",
            "signature": "0x1111111111111111111111111111111111111111111111111111111111111111\
                          2222222222222222222222222222222222222222222222222222222222222222\
                          1b",
        });
        let serialized = serde_json::to_value(signature).unwrap();
        assert_eq!(serialized, expected);
        assert_eq!(
            serde_json::from_value::<Signature>(serialized).unwrap(),
            signature,
        );
    }
}
