//! Split block keys.
//!
//! Every block is sealed under a one-time key formed from two 32-byte halves:
//! the server half, random per block and stored next to the ciphertext, and
//! the client half, derived from the collection's unlocked key material.
//! Neither half alone opens a block.
//!
//! SAFETY GUARANTEES:
//! - Halves and combined keys are zeroized on drop
//! - Debug output never prints key bytes
//! - A combined key cannot be cloned

use hkdf::Hkdf;
use log::trace;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{CryptoError, CryptoResult};

/// Length of each key half and of the combined block key
pub const BLOCK_KEY_LEN: usize = 32;

/// HKDF info label bound into every HKDF-combined block key
pub const HKDF_BLOCK_KEY_INFO: &[u8] = b"cipherfs block key v1";

fn array_from_slice(bytes: &[u8], what: &str) -> CryptoResult<[u8; BLOCK_KEY_LEN]> {
    if bytes.len() != BLOCK_KEY_LEN {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "{} must be {} bytes, got {}",
            what,
            BLOCK_KEY_LEN,
            bytes.len()
        )));
    }
    let mut out = [0u8; BLOCK_KEY_LEN];
    out.copy_from_slice(bytes);
    Ok(out)
}

// ==================== KEY HALVES ====================

/// Random per-block secret held by the block store
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct ServerHalf([u8; BLOCK_KEY_LEN]);

impl ServerHalf {
    pub fn from_bytes(bytes: [u8; BLOCK_KEY_LEN]) -> Self {
        ServerHalf(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        array_from_slice(bytes, "server half").map(ServerHalf)
    }

    /// Draw a fresh server half from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; BLOCK_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        ServerHalf(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for ServerHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerHalf(..)")
    }
}

/// Secret derived from a collection's unlocked keys for one key generation
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ClientHalf([u8; BLOCK_KEY_LEN]);

impl ClientHalf {
    pub fn from_bytes(bytes: [u8; BLOCK_KEY_LEN]) -> Self {
        ClientHalf(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        array_from_slice(bytes, "client half").map(ClientHalf)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; BLOCK_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        ClientHalf(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for ClientHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientHalf(..)")
    }
}

/// One-time key for sealing or opening exactly one block.
/// Lives only for the duration of one seal/open call.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlockKey([u8; BLOCK_KEY_LEN]);

impl BlockKey {
    pub fn as_bytes(&self) -> &[u8; BLOCK_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlockKey(..)")
    }
}

// ==================== KEY COMBINATION ====================

/// Combines a server half and a client half into a block key.
/// Implementations must be pure functions of the two halves.
pub trait KeyCombiner: Send + Sync {
    fn name(&self) -> &'static str;

    fn combine(&self, server: &ServerHalf, client: &ClientHalf) -> CryptoResult<BlockKey>;
}

/// Byte-wise XOR of the two halves
#[derive(Debug, Clone, Copy, Default)]
pub struct XorKeyCombiner;

impl KeyCombiner for XorKeyCombiner {
    fn name(&self) -> &'static str {
        "xor"
    }

    fn combine(&self, server: &ServerHalf, client: &ClientHalf) -> CryptoResult<BlockKey> {
        let mut out = [0u8; BLOCK_KEY_LEN];
        for (o, (s, c)) in out.iter_mut().zip(server.0.iter().zip(client.0.iter())) {
            *o = s ^ c;
        }
        let key = BlockKey(out);
        out.zeroize();
        Ok(key)
    }
}

/// HKDF-SHA256 keyed by the client half and salted with the server half
#[derive(Debug, Clone)]
pub struct HkdfKeyCombiner {
    info: Vec<u8>,
}

impl HkdfKeyCombiner {
    pub fn new(info: impl Into<Vec<u8>>) -> Self {
        HkdfKeyCombiner { info: info.into() }
    }
}

impl Default for HkdfKeyCombiner {
    fn default() -> Self {
        HkdfKeyCombiner::new(HKDF_BLOCK_KEY_INFO)
    }
}

impl KeyCombiner for HkdfKeyCombiner {
    fn name(&self) -> &'static str {
        "hkdf"
    }

    fn combine(&self, server: &ServerHalf, client: &ClientHalf) -> CryptoResult<BlockKey> {
        let hk = Hkdf::<Sha256>::new(Some(server.as_bytes()), client.as_bytes());
        let mut okm = [0u8; BLOCK_KEY_LEN];
        hk.expand(&self.info, &mut okm)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        let key = BlockKey(okm);
        okm.zeroize();
        trace!("combined block key with hkdf ({} byte info)", self.info.len());
        Ok(key)
    }
}

/// Configurable choice of key combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCombinerKind {
    #[default]
    Xor,
    Hkdf,
}

impl KeyCombinerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyCombinerKind::Xor => "xor",
            KeyCombinerKind::Hkdf => "hkdf",
        }
    }

    pub fn build(self) -> Box<dyn KeyCombiner> {
        match self {
            KeyCombinerKind::Xor => Box::new(XorKeyCombiner),
            KeyCombinerKind::Hkdf => Box::new(HkdfKeyCombiner::default()),
        }
    }
}

impl fmt::Display for KeyCombinerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_xor_known_vector() {
        let server = ServerHalf::from_bytes([0xF0; BLOCK_KEY_LEN]);
        let client = ClientHalf::from_bytes([0x0F; BLOCK_KEY_LEN]);
        let key = XorKeyCombiner.combine(&server, &client).unwrap();
        assert_eq!(key.as_bytes(), &[0xFF; BLOCK_KEY_LEN]);
    }

    #[test]
    fn test_hkdf_differs_from_xor() {
        let server = ServerHalf::generate();
        let client = ClientHalf::generate();
        let xor = XorKeyCombiner.combine(&server, &client).unwrap();
        let hkdf = HkdfKeyCombiner::default().combine(&server, &client).unwrap();
        assert_ne!(xor.as_bytes(), hkdf.as_bytes());
    }

    #[test]
    fn test_hkdf_binds_info_label() {
        let server = ServerHalf::from_bytes([1; BLOCK_KEY_LEN]);
        let client = ClientHalf::from_bytes([2; BLOCK_KEY_LEN]);
        let a = HkdfKeyCombiner::new(b"label a".to_vec()).combine(&server, &client).unwrap();
        let b = HkdfKeyCombiner::new(b"label b".to_vec()).combine(&server, &client).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_debug_is_redacted() {
        let server = ServerHalf::from_bytes([0xAB; BLOCK_KEY_LEN]);
        let client = ClientHalf::from_bytes([0xCD; BLOCK_KEY_LEN]);
        let key = XorKeyCombiner.combine(&server, &client).unwrap();
        for rendered in [format!("{:?}", server), format!("{:?}", client), format!("{:?}", key)] {
            assert!(!rendered.contains("ab") && !rendered.contains("171"));
            assert!(rendered.ends_with("(..)"));
        }
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(matches!(
            ServerHalf::from_slice(&[0u8; 31]),
            Err(CryptoError::InvalidKeyFormat(_))
        ));
        assert!(ClientHalf::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_generated_server_halves_are_distinct() {
        assert_ne!(ServerHalf::generate(), ServerHalf::generate());
    }

    #[test]
    fn test_kind_builds_matching_combiner() {
        assert_eq!(KeyCombinerKind::Xor.build().name(), "xor");
        assert_eq!(KeyCombinerKind::Hkdf.build().name(), "hkdf");
        assert_eq!(KeyCombinerKind::default(), KeyCombinerKind::Xor);
    }

    proptest! {
        #[test]
        fn prop_xor_recovers_either_half(s in any::<[u8; 32]>(), c in any::<[u8; 32]>()) {
            let key = XorKeyCombiner
                .combine(&ServerHalf::from_bytes(s), &ClientHalf::from_bytes(c))
                .unwrap();
            // key ^ client must give back the server half
            let back = XorKeyCombiner
                .combine(&ServerHalf::from_bytes(*key.as_bytes()), &ClientHalf::from_bytes(c))
                .unwrap();
            prop_assert_eq!(back.as_bytes(), &s);
        }

        #[test]
        fn prop_combination_is_deterministic(s in any::<[u8; 32]>(), c in any::<[u8; 32]>()) {
            let server = ServerHalf::from_bytes(s);
            let client = ClientHalf::from_bytes(c);
            let combiner = HkdfKeyCombiner::default();
            let a = combiner.combine(&server, &client).unwrap();
            let b = combiner.combine(&server, &client).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }
    }
}
