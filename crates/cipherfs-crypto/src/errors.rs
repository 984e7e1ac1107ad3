use thiserror::Error;

/// Error type for block-level cryptographic operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Block identifier could not be parsed
    #[error("Invalid block id: {0}")]
    InvalidBlockId(String),

    /// Key half had the wrong shape
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Key combination failed
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// Sealing failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Sealed envelope shorter than its fixed header plus tag
    #[error("Sealed block truncated: {len} bytes")]
    Truncated { len: usize },

    /// Sealed envelope written by an unknown format version
    #[error("Unsupported sealed block version {0}")]
    UnsupportedVersion(u8),

    /// AEAD tag did not verify under the supplied key
    #[error("Block authentication failed")]
    AuthenticationFailed,

    /// Authenticated plaintext carried a malformed padding frame
    #[error("Invalid block padding: {0}")]
    InvalidPadding(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
