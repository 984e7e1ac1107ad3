//! Block-level cryptography for cipherfs: content-hash identifiers, split
//! block keys, and authenticated sealing of block plaintext.

pub mod block_cipher;
pub mod block_id;
pub mod block_keys;
pub mod errors;


pub use block_cipher::{depad_block, open_block, pad_block, seal_block, SEALED_BLOCK_VERSION};
pub use block_id::{BlockId, HashType, BLOCK_ID_LEN};
pub use block_keys::{
    BlockKey, ClientHalf, HkdfKeyCombiner, KeyCombiner, KeyCombinerKind, ServerHalf,
    XorKeyCombiner, BLOCK_KEY_LEN,
};
pub use errors::{CryptoError, CryptoResult};
