use async_trait::async_trait;
use cipherfs_crypto::{BlockId, ServerHalf};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

use crate::context::RequestContext;
use crate::errors::StoreError;
use crate::types::{BlockContext, CollectionId, RefNonce};

/// Remote block store boundary. One call is one network round trip.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Fetch the sealed ciphertext and its server half.
    /// `StoreError::BadRequest` signals that the request itself was malformed.
    async fn get(
        &self,
        ctx: &RequestContext,
        collection: &CollectionId,
        id: &BlockId,
        context: &BlockContext,
    ) -> Result<(Vec<u8>, ServerHalf), StoreError>;
}

struct StoredBlock {
    ciphertext: Vec<u8>,
    server_half: ServerHalf,
    refs: HashSet<RefNonce>,
}

/// In-process block store keyed by `(collection, id)` with per-reference
/// bookkeeping
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<(CollectionId, BlockId), StoredBlock>>,
    gets: AtomicUsize,
}

fn check_request(id: &BlockId, context: &BlockContext) -> Result<(), StoreError> {
    if id.is_zero() {
        return Err(StoreError::BadRequest("zero block id".to_string()));
    }
    if context.creator.is_empty() {
        return Err(StoreError::BadRequest(format!("block {} has no creator", id)));
    }
    Ok(())
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block under `id` with `context` as its first reference.
    /// The store does not recompute `id`; callers hand over what they computed.
    pub fn put(
        &self,
        collection: CollectionId,
        id: BlockId,
        context: &BlockContext,
        ciphertext: Vec<u8>,
        server_half: ServerHalf,
    ) -> Result<(), StoreError> {
        check_request(&id, context)?;
        let mut blocks = self.blocks.write();
        match blocks.get_mut(&(collection, id)) {
            Some(existing)
                if existing.ciphertext == ciphertext && existing.server_half == server_half =>
            {
                existing.refs.insert(context.ref_nonce);
                Ok(())
            }
            Some(_) => Err(StoreError::BadRequest(format!(
                "block {} already stored with different contents",
                id
            ))),
            None => {
                let mut refs = HashSet::new();
                refs.insert(context.ref_nonce);
                blocks.insert(
                    (collection, id),
                    StoredBlock {
                        ciphertext,
                        server_half,
                        refs,
                    },
                );
                Ok(())
            }
        }
    }

    /// Register an additional reference to an existing block
    pub fn add_reference(
        &self,
        collection: &CollectionId,
        id: &BlockId,
        context: &BlockContext,
    ) -> Result<(), StoreError> {
        check_request(id, context)?;
        let mut blocks = self.blocks.write();
        let stored = blocks
            .get_mut(&(*collection, *id))
            .ok_or(StoreError::NotFound(*id))?;
        stored.refs.insert(context.ref_nonce);
        Ok(())
    }

    /// Drop one reference; the block is removed with its last reference.
    /// Returns whether the block is still stored.
    pub fn remove_reference(
        &self,
        collection: &CollectionId,
        id: &BlockId,
        context: &BlockContext,
    ) -> Result<bool, StoreError> {
        let mut blocks = self.blocks.write();
        let key = (*collection, *id);
        let stored = blocks.get_mut(&key).ok_or(StoreError::NotFound(*id))?;
        stored.refs.remove(&context.ref_nonce);
        if stored.refs.is_empty() {
            blocks.remove(&key);
            return Ok(false);
        }
        Ok(true)
    }

    /// Number of `get` calls served so far
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get(
        &self,
        ctx: &RequestContext,
        collection: &CollectionId,
        id: &BlockId,
        context: &BlockContext,
    ) -> Result<(Vec<u8>, ServerHalf), StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        trace!(request_id = ctx.request_id(), block = %id, "memory store get");
        check_request(id, context)?;

        let blocks = self.blocks.read();
        match blocks.get(&(*collection, *id)) {
            Some(stored) if stored.refs.contains(&context.ref_nonce) => {
                Ok((stored.ciphertext.clone(), stored.server_half.clone()))
            }
            _ => Err(StoreError::NotFound(*id)),
        }
    }
}
