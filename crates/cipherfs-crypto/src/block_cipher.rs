//! Authenticated sealing of block plaintext.
//!
//! Sealed layout: `version (1) || nonce (12) || AES-256-GCM ciphertext + tag`.
//! Plaintext is padded before sealing so ciphertext length only leaks the
//! power-of-two size class of the block.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::block_keys::BlockKey;
use crate::errors::{CryptoError, CryptoResult};

/// Current sealed envelope version
pub const SEALED_BLOCK_VERSION: u8 = 1;

/// AES-GCM nonce length
pub const NONCE_LEN: usize = 12;

/// AES-GCM tag length
pub const TAG_LEN: usize = 16;

/// Smallest padded plaintext size
pub const MIN_PADDED_LEN: usize = 256;

const LEN_PREFIX: usize = 4;
const HEADER_LEN: usize = 1 + NONCE_LEN;

// ==================== PADDING ====================

/// Frame `payload` as `len (u32 LE) || payload || zeros`, rounded up to the
/// next power of two and at least [`MIN_PADDED_LEN`] bytes.
pub fn pad_block(payload: &[u8]) -> CryptoResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        CryptoError::EncryptionFailed(format!("block of {} bytes is too large", payload.len()))
    })?;
    let total = (payload.len() + LEN_PREFIX)
        .next_power_of_two()
        .max(MIN_PADDED_LEN);

    let mut padded = Vec::with_capacity(total);
    padded.extend_from_slice(&len.to_le_bytes());
    padded.extend_from_slice(payload);
    padded.resize(total, 0);
    Ok(padded)
}

/// Strip the padding frame written by [`pad_block`]
pub fn depad_block(padded: &[u8]) -> CryptoResult<Vec<u8>> {
    if padded.len() < LEN_PREFIX {
        return Err(CryptoError::InvalidPadding(format!(
            "frame of {} bytes has no length prefix",
            padded.len()
        )));
    }
    let mut prefix = [0u8; LEN_PREFIX];
    prefix.copy_from_slice(&padded[..LEN_PREFIX]);
    let len = u32::from_le_bytes(prefix) as usize;

    let end = LEN_PREFIX
        .checked_add(len)
        .filter(|end| *end <= padded.len())
        .ok_or_else(|| {
            CryptoError::InvalidPadding(format!(
                "declared length {} exceeds frame of {} bytes",
                len,
                padded.len()
            ))
        })?;

    if padded[end..].iter().any(|b| *b != 0) {
        return Err(CryptoError::InvalidPadding("non-zero fill after payload".to_string()));
    }
    Ok(padded[LEN_PREFIX..end].to_vec())
}

// ==================== SEAL / OPEN ====================

fn cipher_for(key: &BlockKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Pad and seal `plaintext` under a one-time block key
pub fn seal_block(key: &BlockKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut padded = pad_block(plaintext)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let sealed = cipher_for(key)
        .encrypt(Nonce::from_slice(&nonce_bytes), padded.as_slice())
        .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM encryption failed: {}", e)));
    padded.zeroize();
    let sealed = sealed?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.push(SEALED_BLOCK_VERSION);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Authenticate and open a sealed block, returning the unpadded plaintext.
///
/// Envelope and tag failures are reported before any padding is inspected,
/// so `InvalidPadding` only ever describes authenticated bytes.
pub fn open_block(key: &BlockKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::Truncated { len: sealed.len() });
    }
    if sealed[0] != SEALED_BLOCK_VERSION {
        return Err(CryptoError::UnsupportedVersion(sealed[0]));
    }

    let nonce = Nonce::from_slice(&sealed[1..HEADER_LEN]);
    let mut padded = cipher_for(key)
        .decrypt(nonce, &sealed[HEADER_LEN..])
        .map_err(|_| {
            debug!("sealed block of {} bytes failed authentication", sealed.len());
            CryptoError::AuthenticationFailed
        })?;

    let plaintext = depad_block(&padded);
    padded.zeroize();
    plaintext
}
