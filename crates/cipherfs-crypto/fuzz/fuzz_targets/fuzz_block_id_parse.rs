//! Fuzz harness for `BlockId::from_hex` and `BlockId::from_bytes`.
//!
//! Parsing must never panic, and every id that parses must render back to
//! the same canonical form.

#![no_main]
use cipherfs_crypto::BlockId;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(id) = BlockId::from_bytes(data) {
        assert_eq!(&id.to_bytes()[..], data);
    }
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(id) = BlockId::from_hex(text) {
            assert_eq!(BlockId::from_hex(&id.to_hex()).ok(), Some(id));
        }
    }
});
