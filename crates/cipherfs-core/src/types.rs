use cipherfs_crypto::BlockId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// ═══════════════════════════════════════════════════════════════════════════════
/// IDENTIFIERS
/// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier of a collection (top-level namespace)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CollectionId([u8; 16]);

impl CollectionId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        CollectionId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({})", self.to_hex())
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// User identity as it appears in block contexts and key metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(name: impl Into<String>) -> Self {
        UserId(name.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key generation of a collection. Generation 1 is the first valid one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct KeyGen(pub u32);

impl KeyGen {
    pub const FIRST_VALID: KeyGen = KeyGen(1);

    pub fn is_valid(&self) -> bool {
        *self >= Self::FIRST_VALID
    }
}

impl fmt::Display for KeyGen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distinguishes additional references to the same block. All zeros is the
/// block's original reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RefNonce(pub [u8; 8]);

impl RefNonce {
    pub const ZERO: RefNonce = RefNonce([0u8; 8]);
}

/// ═══════════════════════════════════════════════════════════════════════════════
/// POINTERS
/// ═══════════════════════════════════════════════════════════════════════════════

/// Permission/ownership context of one block reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockContext {
    /// User that first wrote the block
    pub creator: UserId,
    /// User that wrote this reference (differs from `creator` for copies)
    pub writer: UserId,
    pub ref_nonce: RefNonce,
}

impl BlockContext {
    /// Context for a block's original reference
    pub fn first_ref(creator: UserId) -> Self {
        BlockContext {
            writer: creator.clone(),
            creator,
            ref_nonce: RefNonce::ZERO,
        }
    }
}

/// Selects which decoded variant a block produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Raw file content
    Leaf,
    /// Directory listing
    Directory,
    /// List of child pointers
    Indirect,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Leaf => "leaf",
            DataType::Directory => "directory",
            DataType::Indirect => "indirect",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable reference to one stored block; also the request dedup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPointer {
    pub id: BlockId,
    pub key_gen: KeyGen,
    pub data_type: DataType,
    pub context: BlockContext,
}

impl fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} ({}, writer {})",
            self.id, self.key_gen, self.data_type, self.context.writer
        )
    }
}

/// ═══════════════════════════════════════════════════════════════════════════════
/// KEY METADATA
/// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of a collection's current key material, supplied per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub collection_id: CollectionId,
    pub latest_key_gen: KeyGen,
    pub writers: BTreeSet<UserId>,
    pub readers: BTreeSet<UserId>,
}

impl KeyMetadata {
    pub fn new(collection_id: CollectionId, latest_key_gen: KeyGen) -> Self {
        KeyMetadata {
            collection_id,
            latest_key_gen,
            writers: BTreeSet::new(),
            readers: BTreeSet::new(),
        }
    }

    pub fn with_writer(mut self, user: UserId) -> Self {
        self.writers.insert(user);
        self
    }

    pub fn with_reader(mut self, user: UserId) -> Self {
        self.readers.insert(user);
        self
    }

    /// Whether `key_gen` can be resolved under this snapshot
    pub fn covers(&self, key_gen: KeyGen) -> bool {
        key_gen.is_valid() && key_gen <= self.latest_key_gen
    }

    pub fn permissions(&self) -> ResolvedPermissions<'_> {
        ResolvedPermissions { writers: &self.writers }
    }
}

/// What current key material says about who may have written blocks
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPermissions<'a> {
    pub writers: &'a BTreeSet<UserId>,
}

impl ResolvedPermissions<'_> {
    pub fn is_writer(&self, user: &UserId) -> bool {
        self.writers.contains(user)
    }
}
