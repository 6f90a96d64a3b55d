use primitive_types::H256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The 32 byte preimage that unlocks both escrows of a swap.
///
/// Generated by the maker, held by the relayer and only published once both
/// escrows are funded. The hashlock commitment uses sha256 rather than
/// keccak so that output based chains can verify it in script.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Secret(pub H256);

impl Secret {
    pub fn hashlock(&self) -> H256 {
        H256(Sha256::digest(self.0.as_bytes()).into())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Never log the preimage, it is the key to locked funds.
        f.write_str("Secret(****)")
    }
}
