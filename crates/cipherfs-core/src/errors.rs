use cipherfs_crypto::BlockId;
use thiserror::Error;

use crate::types::{DataType, KeyGen};

/// Failure reported by the block store boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("block {0} not found")]
    NotFound(BlockId),

    #[error("block store transport error: {0}")]
    Transport(String),

    #[error("block store throttled the request: {0}")]
    Throttled(String),

    /// The store judged the request itself malformed
    #[error("block store rejected a malformed request: {0}")]
    BadRequest(String),
}

/// Failure reported by a key deriver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key generation {key_gen} is not covered by metadata (latest {latest})")]
    UnknownKeyGen { key_gen: KeyGen, latest: KeyGen },

    #[error("no unlocked key for key generation {0}")]
    Locked(KeyGen),

    #[error("caller may not read this collection: {0}")]
    NotAuthorized(String),
}

/// Failure reported by a codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("cannot decode {data_type} block: {reason}")]
    Decode { data_type: DataType, reason: String },

    #[error("cannot encode {data_type} block: {reason}")]
    Encode { data_type: DataType, reason: String },
}

/// Every failure the fetch pipeline or coordinator can surface.
/// `Clone` so one outcome can be delivered to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("block store request failed: {0}")]
    Store(#[source] StoreError),

    #[error("malformed request for block {id}: {reason}")]
    MalformedRequest { id: BlockId, reason: String },

    #[error("invalid block pointer: {reason}")]
    InvalidPointer { reason: String },

    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: BlockId, actual: BlockId },

    #[error("context of block {id} does not match collection key material: {reason}")]
    ContextMismatch { id: BlockId, reason: String },

    #[error("access denied for block {id}: {reason}")]
    AccessDenied { id: BlockId, reason: String },

    #[error("block {id} failed authenticated decryption: {reason}")]
    DecryptionFailed { id: BlockId, reason: String },

    #[error("decoding {data_type} block {id} failed: {reason}")]
    Decode {
        id: BlockId,
        data_type: DataType,
        reason: String,
    },

    #[error("encoding {data_type} block failed: {reason}")]
    Encode { data_type: DataType, reason: String },

    #[error("request {request_id} canceled")]
    Canceled { request_id: String },

    #[error("request {request_id} deadline exceeded")]
    DeadlineExceeded { request_id: String },

    #[error("fetch of block {id} ended without a result")]
    Abandoned { id: BlockId },
}

impl From<StoreError> for FetchError {
    fn from(err: StoreError) -> Self {
        FetchError::Store(err)
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
