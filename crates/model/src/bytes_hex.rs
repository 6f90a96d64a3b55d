//! Serialization of byte vectors as 0x-prefixed hex strings.

use serde::{de, Deserializer, Serializer};
use std::fmt;

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor {}
    impl de::Visitor<'_> for Visitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a hex encoded string starting with 0x")
        }

        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let s = s.strip_prefix("0x").ok_or_else(|| {
                de::Error::custom(format!("failed to decode {s:?}: missing \"0x\" prefix"))
            })?;
            hex::decode(s).map_err(|err| {
                de::Error::custom(format!("failed to decode {s:?} as hex: {err}"))
            })
        }
    }
    deserializer.deserialize_str(Visitor {})
}
