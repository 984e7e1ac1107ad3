// BLOCK FETCH PIPELINE
// One fetch: store round trip, content-hash check, key combination,
// authenticated decrypt, decode.
//
// SAFETY INVARIANTS:
// 1. No block is returned unless its ciphertext matched the pointer id AND
//    authenticated decryption succeeded
// 2. A hash mismatch stops processing before key resolution or decryption
// 3. The combined block key is dropped (and zeroized) right after one open/seal
// 4. The pipeline keeps no state between calls; exactly one store call per fetch
// 5. Every security-fatal result is handed to the fatal-fault hook once

use cipherfs_crypto::{
    open_block, seal_block, BlockId, CryptoError, KeyCombiner, ServerHalf, XorKeyCombiner,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::block::Block;
use crate::block_store::BlockStore;
use crate::classifier::{ErrorClass, FatalFault, FatalFaultHook, LogFatalFaults};
use crate::codec::{BincodeCodec, Codec};
use crate::context::RequestContext;
use crate::errors::{FetchError, FetchResult, StoreError};
use crate::integrity::{ContentHashVerifier, IntegrityVerifier};
use crate::key_deriver::KeyDeriver;
use crate::observability::{FetchObserver, NoopObserver};
use crate::types::{BlockContext, BlockPointer, KeyMetadata};

/// Sealed block ready to hand to a block store, plus the pointer that reads it back
#[derive(Debug, Clone)]
pub struct ReadyBlock {
    pub pointer: BlockPointer,
    pub ciphertext: Vec<u8>,
    pub server_half: ServerHalf,
}

pub struct BlockFetchPipeline {
    store: Arc<dyn BlockStore>,
    keys: Arc<dyn KeyDeriver>,
    codec: Arc<dyn Codec>,
    verifier: Arc<dyn IntegrityVerifier>,
    combiner: Arc<dyn KeyCombiner>,
    observer: Arc<dyn FetchObserver>,
    fault_hook: Arc<dyn FatalFaultHook>,
    verify_context: bool,
}

fn check_pointer(pointer: &BlockPointer) -> FetchResult<()> {
    if pointer.id.is_zero() {
        return Err(FetchError::InvalidPointer {
            reason: "zero block id".to_string(),
        });
    }
    if !pointer.key_gen.is_valid() {
        return Err(FetchError::InvalidPointer {
            reason: format!("invalid key generation {} for block {}", pointer.key_gen, pointer.id),
        });
    }
    Ok(())
}

impl BlockFetchPipeline {
    /// Pipeline with the default codec, verifier, XOR key combination, no
    /// instrumentation, and log-only fatal faults
    pub fn new(store: Arc<dyn BlockStore>, keys: Arc<dyn KeyDeriver>) -> Self {
        BlockFetchPipeline {
            store,
            keys,
            codec: Arc::new(BincodeCodec::default()),
            verifier: Arc::new(ContentHashVerifier),
            combiner: Arc::new(XorKeyCombiner),
            observer: Arc::new(NoopObserver),
            fault_hook: Arc::new(LogFatalFaults),
            verify_context: false,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn IntegrityVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_key_combiner(mut self, combiner: Arc<dyn KeyCombiner>) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_fault_hook(mut self, hook: Arc<dyn FatalFaultHook>) -> Self {
        self.fault_hook = hook;
        self
    }

    /// Also require each pointer's context to match current key material
    pub fn with_context_check(mut self, enabled: bool) -> Self {
        self.verify_context = enabled;
        self
    }

    pub fn key_combiner_name(&self) -> &'static str {
        self.combiner.name()
    }

    /// Fetch, verify, decrypt and decode one block
    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        md: &KeyMetadata,
        pointer: &BlockPointer,
    ) -> FetchResult<Block> {
        let result = self.fetch_unreported(ctx, md, pointer).await;
        if let Err(err) = &result {
            self.report(ctx, md, pointer, err);
        }
        result
    }

    pub(crate) async fn fetch_unreported(
        &self,
        ctx: &RequestContext,
        md: &KeyMetadata,
        pointer: &BlockPointer,
    ) -> FetchResult<Block> {
        check_pointer(pointer)?;

        self.observer.on_fetch_start(ctx, pointer);
        let fetched = match ctx
            .run(self.store.get(ctx, &md.collection_id, &pointer.id, &pointer.context))
            .await
        {
            Ok(Ok(found)) => Ok(found),
            Ok(Err(StoreError::BadRequest(reason))) => Err(FetchError::MalformedRequest {
                id: pointer.id,
                reason,
            }),
            Ok(Err(err)) => Err(FetchError::Store(err)),
            Err(ctx_err) => Err(ctx_err),
        };
        self.observer
            .on_fetch_end(ctx, pointer, fetched.as_ref().map(|(ciphertext, _)| ciphertext.len()));
        let (ciphertext, server_half) = fetched?;

        let assembled = self.assemble_block(md, pointer, &ciphertext, &server_half).await;
        self.observer
            .on_assemble_end(ctx, pointer, assembled.as_ref().err().map(FetchError::class));
        assembled
    }

    /// Verify and open ciphertext already obtained from a store.
    /// Does not invoke the fatal-fault hook; [`fetch`](Self::fetch) does.
    pub async fn assemble_block(
        &self,
        md: &KeyMetadata,
        pointer: &BlockPointer,
        ciphertext: &[u8],
        server_half: &ServerHalf,
    ) -> FetchResult<Block> {
        if !self.verifier.verify_content_hash(ciphertext, &pointer.id) {
            return Err(FetchError::HashMismatch {
                expected: pointer.id,
                actual: BlockId::for_ciphertext(ciphertext),
            });
        }

        if self.verify_context
            && !self.verifier.verify_context(&pointer.context, &md.permissions())
        {
            return Err(FetchError::ContextMismatch {
                id: pointer.id,
                reason: format!(
                    "writer {} (creator {}) is not a writer of collection {}",
                    pointer.context.writer, pointer.context.creator, md.collection_id
                ),
            });
        }

        let client_half = self
            .keys
            .client_half(md, pointer.key_gen, &pointer.context)
            .await
            .map_err(|e| FetchError::AccessDenied {
                id: pointer.id,
                reason: e.to_string(),
            })?;

        let plaintext = {
            let key = self
                .combiner
                .combine(server_half, &client_half)
                .map_err(|e| FetchError::DecryptionFailed {
                    id: pointer.id,
                    reason: e.to_string(),
                })?;
            open_block(&key, ciphertext).map_err(|e| match e {
                CryptoError::InvalidPadding(reason) => FetchError::Decode {
                    id: pointer.id,
                    data_type: pointer.data_type,
                    reason,
                },
                other => FetchError::DecryptionFailed {
                    id: pointer.id,
                    reason: other.to_string(),
                },
            })?
        };

        let block = self
            .codec
            .decode(&plaintext, pointer.data_type)
            .map_err(|e| FetchError::Decode {
                id: pointer.id,
                data_type: pointer.data_type,
                reason: e.to_string(),
            })?;

        if block.data_type() != pointer.data_type {
            return Err(FetchError::Decode {
                id: pointer.id,
                data_type: pointer.data_type,
                reason: format!("codec produced a {} block", block.data_type()),
            });
        }
        Ok(block)
    }

    /// Encode and seal `block` under the latest key generation of `md` with
    /// a freshly generated server half
    pub async fn ready_block(
        &self,
        ctx: &RequestContext,
        md: &KeyMetadata,
        block: &Block,
        context: BlockContext,
    ) -> FetchResult<ReadyBlock> {
        let data_type = block.data_type();
        let key_gen = md.latest_key_gen;

        let plaintext = self.codec.encode(block).map_err(|e| FetchError::Encode {
            data_type,
            reason: e.to_string(),
        })?;

        let client_half = ctx
            .run(self.keys.client_half(md, key_gen, &context))
            .await?
            .map_err(|e| FetchError::AccessDenied {
                id: BlockId::ZERO,
                reason: e.to_string(),
            })?;

        let server_half = ServerHalf::generate();
        let ciphertext = {
            let key = self
                .combiner
                .combine(&server_half, &client_half)
                .map_err(|e| FetchError::Encode {
                    data_type,
                    reason: e.to_string(),
                })?;
            seal_block(&key, &plaintext).map_err(|e| FetchError::Encode {
                data_type,
                reason: e.to_string(),
            })?
        };

        let id = BlockId::for_ciphertext(&ciphertext);
        debug!(
            request_id = ctx.request_id(),
            block = %id,
            bytes = ciphertext.len(),
            "readied {} block",
            data_type
        );
        Ok(ReadyBlock {
            pointer: BlockPointer {
                id,
                key_gen,
                data_type,
                context,
            },
            ciphertext,
            server_half,
        })
    }

    /// Log a failed fetch and hand security-fatal results to the fatal-fault hook
    pub(crate) fn report(
        &self,
        ctx: &RequestContext,
        md: &KeyMetadata,
        pointer: &BlockPointer,
        err: &FetchError,
    ) {
        let class = err.class();
        match class {
            ErrorClass::IntegrityFailure | ErrorClass::ProtocolViolation => {
                self.fault_hook.on_fatal_fault(&FatalFault {
                    class,
                    collection_id: md.collection_id,
                    pointer: pointer.clone(),
                    error: err.clone(),
                });
            }
            ErrorClass::AccessDenied => {
                warn!(
                    request_id = ctx.request_id(),
                    block = %pointer.id,
                    "block fetch denied: {}",
                    err
                );
            }
            ErrorClass::Transient | ErrorClass::DecodeFailure => {
                debug!(
                    request_id = ctx.request_id(),
                    block = %pointer.id,
                    class = class.as_str(),
                    "block fetch failed: {}",
                    err
                );
            }
        }
    }
}
