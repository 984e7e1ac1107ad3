// === Data Model ===
pub mod block;
pub mod types;

// === Boundaries ===
pub mod block_store;
pub mod codec;
pub mod integrity;
pub mod key_deriver;

// === Errors and Classification ===
pub mod classifier;
pub mod errors;

// === Retrieval ===
pub mod context;
pub mod coordinator;
pub mod observability;
pub mod pipeline;

// === Configuration ===
pub mod engine_config;

// === Re-exports for broader ecosystem access ===
pub use block::{Block, DirBlock, DirEntry, EntryType, IndirectBlock, IndirectPointer, LeafBlock};
pub use block_store::{BlockStore, MemoryBlockStore};
pub use classifier::{
    classify, AbortOnFatalFault, ErrorClass, FatalFault, FatalFaultHook, FatalFaultPolicy,
    LogFatalFaults, PanicOnFatalFault,
};
pub use codec::{BincodeCodec, Codec, DEFAULT_MAX_BLOCK_SIZE};
pub use context::RequestContext;
pub use coordinator::RetrievalCoordinator;
pub use engine_config::{ConfigError, EngineConfig};
pub use errors::{CodecError, FetchError, FetchResult, KeyError, StoreError};
pub use integrity::{ContentHashVerifier, IntegrityVerifier};
pub use key_deriver::{KeyDeriver, Keyring};
pub use observability::{
    FetchCounters, FetchCountersSnapshot, FetchObserver, NoopObserver, TracingObserver,
};
pub use pipeline::{BlockFetchPipeline, ReadyBlock};
pub use types::{
    BlockContext, BlockPointer, CollectionId, DataType, KeyGen, KeyMetadata, RefNonce,
    ResolvedPermissions, UserId,
};
