use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{BlockPointer, DataType};

/// Leaf block: a run of file content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeafBlock {
    pub contents: Vec<u8>,
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    File,
    Exec,
    Dir,
    Sym,
}

/// One named child of a directory block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub pointer: BlockPointer,
    pub entry_type: EntryType,
    pub size: u64,
    /// Modification time, nanoseconds since the UNIX epoch
    pub mtime: i64,
    /// Symlink target; empty unless `entry_type` is `Sym`
    pub sym_path: String,
}

/// Directory block: name -> entry, ordered by name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirBlock {
    pub children: BTreeMap<String, DirEntry>,
}

/// Child reference of an indirect block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectPointer {
    pub pointer: BlockPointer,
    /// Byte offset (file) or first name (directory) the child starts at
    pub offset: u64,
}

/// Indirect block: ordered list of child pointers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndirectBlock {
    pub is_dir: bool,
    pub children: Vec<IndirectPointer>,
}

/// Decoded block handed to callers. Produced fresh per fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Leaf(LeafBlock),
    Directory(DirBlock),
    Indirect(IndirectBlock),
}

impl Block {
    pub fn leaf(contents: impl Into<Vec<u8>>) -> Self {
        Block::Leaf(LeafBlock { contents: contents.into() })
    }

    /// Tag a pointer to this block must carry
    pub fn data_type(&self) -> DataType {
        match self {
            Block::Leaf(_) => DataType::Leaf,
            Block::Directory(_) => DataType::Directory,
            Block::Indirect(_) => DataType::Indirect,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafBlock> {
        match self {
            Block::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_dir(&self) -> Option<&DirBlock> {
        match self {
            Block::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_indirect(&self) -> Option<&IndirectBlock> {
        match self {
            Block::Indirect(indirect) => Some(indirect),
            _ => None,
        }
    }
}
