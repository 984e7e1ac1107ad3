//! cipherfs block engine.
//!
//! [`Engine`] is the upward interface: `fetch_block(ctx, md, pointer)`
//! returns a verified, decrypted and decoded [`Block`] or a classified
//! [`FetchError`]. Concurrent fetches of one pointer share a single store
//! round trip. Callers own caching, retries and interpretation of the block.

pub mod admin;

use std::sync::Arc;
use tracing::info;

pub use cipherfs_core::{
    Block, BlockContext, BlockPointer, BlockStore, CollectionId, ConfigError, DataType,
    EngineConfig, ErrorClass, FatalFaultPolicy, FetchError, FetchObserver, FetchResult, KeyDeriver,
    KeyGen, KeyMetadata, ReadyBlock, RequestContext, RetrievalCoordinator, TracingObserver, UserId,
};
pub use cipherfs_crypto::BlockId;

pub struct Engine {
    config: EngineConfig,
    coordinator: RetrievalCoordinator,
}

impl Engine {
    /// Engine with `tracing` phase events
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn BlockStore>,
        keys: Arc<dyn KeyDeriver>,
    ) -> Result<Self, ConfigError> {
        Self::with_observer(config, store, keys, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        config: EngineConfig,
        store: Arc<dyn BlockStore>,
        keys: Arc<dyn KeyDeriver>,
        observer: Arc<dyn FetchObserver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let pipeline = Arc::new(config.build_pipeline(store, keys).with_observer(observer));
        let coordinator = config.build_coordinator(pipeline);
        info!(
            key_combiner = %config.key_combiner,
            verify_context = config.verify_context,
            request_timeout_ms = config.request_timeout_ms,
            "block engine ready"
        );
        Ok(Engine { config, coordinator })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &RetrievalCoordinator {
        &self.coordinator
    }

    /// Fresh request context bounded by the configured request timeout
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.config.request_timeout())
    }

    pub async fn fetch_block(
        &self,
        ctx: &RequestContext,
        md: &KeyMetadata,
        pointer: &BlockPointer,
    ) -> FetchResult<Block> {
        self.coordinator.request(ctx, md, pointer).await
    }

    /// Seal `block` for storage under the latest key generation of `md`
    pub async fn ready_block(
        &self,
        ctx: &RequestContext,
        md: &KeyMetadata,
        block: &Block,
        context: BlockContext,
    ) -> FetchResult<ReadyBlock> {
        self.coordinator.pipeline().ready_block(ctx, md, block, context).await
    }
}
