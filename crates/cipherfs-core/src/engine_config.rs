use cipherfs_crypto::KeyCombinerKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::block_store::BlockStore;
use crate::classifier::FatalFaultPolicy;
use crate::codec::{BincodeCodec, DEFAULT_MAX_BLOCK_SIZE};
use crate::coordinator::RetrievalCoordinator;
use crate::key_deriver::KeyDeriver;
use crate::pipeline::BlockFetchPipeline;

/// Environment variable prefix, e.g. `CIPHERFS_REQUEST_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "CIPHERFS";

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 29_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load engine configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}

/// Engine settings. Every field has a default, so an empty source is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline given to each caller's request context
    pub request_timeout_ms: u64,
    /// Optional bound on each shared fetch, independent of waiters
    pub fetch_timeout_ms: Option<u64>,
    pub key_combiner: KeyCombinerKind,
    /// Check each pointer's context against the collection writers
    pub verify_context: bool,
    pub fatal_fault_policy: FatalFaultPolicy,
    /// Upper bound on encoded block size accepted by the codec
    pub max_block_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            fetch_timeout_ms: None,
            key_combiner: KeyCombinerKind::default(),
            verify_context: false,
            fatal_fault_policy: FatalFaultPolicy::default(),
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load from an optional file (format chosen by extension), then apply
    /// `CIPHERFS_*` environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: EngineConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".to_string()));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "fetch_timeout_ms must be positive when set".to_string(),
            ));
        }
        if self.max_block_size == 0 {
            return Err(ConfigError::Invalid("max_block_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Pipeline wired with the configured codec limit, key combination,
    /// context check and fatal-fault policy
    pub fn build_pipeline(
        &self,
        store: Arc<dyn BlockStore>,
        keys: Arc<dyn KeyDeriver>,
    ) -> BlockFetchPipeline {
        BlockFetchPipeline::new(store, keys)
            .with_codec(Arc::new(BincodeCodec::new(self.max_block_size)))
            .with_key_combiner(Arc::from(self.key_combiner.build()))
            .with_fault_hook(self.fatal_fault_policy.build())
            .with_context_check(self.verify_context)
    }

    pub fn build_coordinator(&self, pipeline: Arc<BlockFetchPipeline>) -> RetrievalCoordinator {
        RetrievalCoordinator::new(pipeline).with_fetch_timeout(self.fetch_timeout())
    }
}
