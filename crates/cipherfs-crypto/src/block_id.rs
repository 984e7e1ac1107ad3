//! Content-addressed block identifiers.
//!
//! A block id is a one-byte hash type followed by the digest of the sealed
//! ciphertext exactly as the block store holds it. Anyone holding the
//! ciphertext can recompute the id; no key material is involved.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::errors::{CryptoError, CryptoResult};

/// Length of the digest part of a block id
pub const BLOCK_DIGEST_LEN: usize = 32;

/// Length of a serialized block id (hash type byte + digest)
pub const BLOCK_ID_LEN: usize = 1 + BLOCK_DIGEST_LEN;

/// Hash function that produced a block id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum HashType {
    /// Marks the zero id; never produced by hashing
    #[default]
    Invalid = 0,
    /// SHA-256 over the sealed ciphertext
    Sha256V1 = 1,
}

impl HashType {
    pub fn from_byte(byte: u8) -> CryptoResult<Self> {
        match byte {
            0 => Ok(HashType::Invalid),
            1 => Ok(HashType::Sha256V1),
            other => Err(CryptoError::InvalidBlockId(format!(
                "unknown hash type {:#04x}",
                other
            ))),
        }
    }

    fn digest(self, data: &[u8]) -> Option<[u8; BLOCK_DIGEST_LEN]> {
        match self {
            HashType::Invalid => None,
            HashType::Sha256V1 => {
                let result = Sha256::digest(data);
                let mut output = [0u8; BLOCK_DIGEST_LEN];
                output.copy_from_slice(&result);
                Some(output)
            }
        }
    }
}

/// Identifier of one stored ciphertext block
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockId {
    hash_type: HashType,
    digest: [u8; BLOCK_DIGEST_LEN],
}

impl BlockId {
    /// The empty identifier
    pub const ZERO: BlockId = BlockId {
        hash_type: HashType::Invalid,
        digest: [0u8; BLOCK_DIGEST_LEN],
    };

    /// Compute the id of a sealed ciphertext with the current hash type
    pub fn for_ciphertext(ciphertext: &[u8]) -> Self {
        let hash_type = HashType::Sha256V1;
        let digest = hash_type
            .digest(ciphertext)
            .unwrap_or([0u8; BLOCK_DIGEST_LEN]);
        BlockId { hash_type, digest }
    }

    pub fn from_parts(hash_type: HashType, digest: [u8; BLOCK_DIGEST_LEN]) -> Self {
        BlockId { hash_type, digest }
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    pub fn digest(&self) -> &[u8; BLOCK_DIGEST_LEN] {
        &self.digest
    }

    pub fn is_zero(&self) -> bool {
        self.hash_type == HashType::Invalid
    }

    /// Recompute the digest of `ciphertext` with this id's hash type and
    /// compare. The zero id matches nothing.
    pub fn matches(&self, ciphertext: &[u8]) -> bool {
        match self.hash_type.digest(ciphertext) {
            Some(digest) => digest == self.digest,
            None => false,
        }
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_ID_LEN] {
        let mut out = [0u8; BLOCK_ID_LEN];
        out[0] = self.hash_type as u8;
        out[1..].copy_from_slice(&self.digest);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != BLOCK_ID_LEN {
            return Err(CryptoError::InvalidBlockId(format!(
                "block id must be {} bytes, got {}",
                BLOCK_ID_LEN,
                bytes.len()
            )));
        }
        let hash_type = HashType::from_byte(bytes[0])?;
        let mut digest = [0u8; BLOCK_DIGEST_LEN];
        digest.copy_from_slice(&bytes[1..]);
        Ok(BlockId { hash_type, digest })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CryptoError::InvalidBlockId(format!("bad hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.to_hex())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for BlockId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
