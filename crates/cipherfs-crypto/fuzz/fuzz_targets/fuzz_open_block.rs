//! Fuzz harness for `open_block`.
//!
//! Arbitrary envelopes must be rejected with an error, never a panic, and
//! never accepted under a key that did not seal them.

#![no_main]
use cipherfs_crypto::{open_block, ClientHalf, KeyCombiner, ServerHalf, XorKeyCombiner};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = XorKeyCombiner
        .combine(
            &ServerHalf::from_bytes([0x11; 32]),
            &ClientHalf::from_bytes([0x22; 32]),
        )
        .expect("xor combination is infallible");
    assert!(open_block(&key, data).is_err());
});
