use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::block::{Block, DirBlock, IndirectBlock, LeafBlock};
use crate::errors::CodecError;
use crate::types::DataType;

/// Default upper bound on an encoded block
pub const DEFAULT_MAX_BLOCK_SIZE: u64 = 512 * 1024;

/// Pluggable serializer between plaintext bytes and typed blocks.
/// Decoding dispatches on the pointer's data-type tag only.
#[cfg_attr(test, mockall::automock)]
pub trait Codec: Send + Sync {
    fn encode(&self, block: &Block) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8], data_type: DataType) -> Result<Block, CodecError>;
}

/// bincode 1.x codec: fixed-width integers, trailing bytes rejected,
/// bounded allocation
#[derive(Debug, Clone, Copy)]
pub struct BincodeCodec {
    max_block_size: u64,
}

impl BincodeCodec {
    pub fn new(max_block_size: u64) -> Self {
        BincodeCodec { max_block_size }
    }

    pub fn max_block_size(&self) -> u64 {
        self.max_block_size
    }

    fn options(&self) -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .reject_trailing_bytes()
            .with_limit(self.max_block_size)
    }

    fn encode_variant<T: Serialize>(
        &self,
        value: &T,
        data_type: DataType,
    ) -> Result<Vec<u8>, CodecError> {
        self.options().serialize(value).map_err(|e| CodecError::Encode {
            data_type,
            reason: e.to_string(),
        })
    }

    fn decode_variant<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        data_type: DataType,
    ) -> Result<T, CodecError> {
        self.options().deserialize(bytes).map_err(|e| CodecError::Decode {
            data_type,
            reason: e.to_string(),
        })
    }
}

impl Default for BincodeCodec {
    fn default() -> Self {
        BincodeCodec::new(DEFAULT_MAX_BLOCK_SIZE)
    }
}

impl Codec for BincodeCodec {
    fn encode(&self, block: &Block) -> Result<Vec<u8>, CodecError> {
        match block {
            Block::Leaf(leaf) => self.encode_variant(leaf, DataType::Leaf),
            Block::Directory(dir) => self.encode_variant(dir, DataType::Directory),
            Block::Indirect(indirect) => self.encode_variant(indirect, DataType::Indirect),
        }
    }

    fn decode(&self, bytes: &[u8], data_type: DataType) -> Result<Block, CodecError> {
        match data_type {
            DataType::Leaf => self.decode_variant::<LeafBlock>(bytes, data_type).map(Block::Leaf),
            DataType::Directory => self
                .decode_variant::<DirBlock>(bytes, data_type)
                .map(Block::Directory),
            DataType::Indirect => self
                .decode_variant::<IndirectBlock>(bytes, data_type)
                .map(Block::Indirect),
        }
    }
}
