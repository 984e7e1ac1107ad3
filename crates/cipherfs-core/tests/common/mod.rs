// Shared fixtures for the cipherfs-core integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use cipherfs_core::{
    BincodeCodec, Block, BlockContext, BlockFetchPipeline, BlockPointer, BlockStore, Codec,
    CodecError, CollectionId, DataType, FatalFault, FatalFaultHook, KeyGen, KeyMetadata, Keyring,
    MemoryBlockStore, RequestContext, StoreError, UserId,
};
use cipherfs_crypto::{BlockId, ClientHalf, ServerHalf};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn alice() -> UserId {
    UserId::new("alice")
}

/// One collection with generation 1 unlocked, backed by an in-memory store
pub struct Fixture {
    pub collection: CollectionId,
    pub md: KeyMetadata,
    pub store: Arc<MemoryBlockStore>,
    pub keyring: Arc<Keyring>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let collection = CollectionId::from_bytes([0x42; 16]);
        let keyring = Arc::new(Keyring::new());
        keyring.unlock(collection, KeyGen(1), ClientHalf::generate());
        Fixture {
            collection,
            md: KeyMetadata::new(collection, KeyGen(1)).with_writer(alice()),
            store: Arc::new(MemoryBlockStore::new()),
            keyring,
        }
    }

    pub fn pipeline(&self) -> BlockFetchPipeline {
        BlockFetchPipeline::new(self.store.clone(), self.keyring.clone())
    }

    /// Seal `block` with `writer` and store it
    pub async fn put_with(
        &self,
        writer: &BlockFetchPipeline,
        block: &Block,
        context: BlockContext,
    ) -> BlockPointer {
        let ready = writer
            .ready_block(&RequestContext::new(), &self.md, block, context)
            .await
            .unwrap();
        self.store
            .put(
                self.collection,
                ready.pointer.id,
                &ready.pointer.context,
                ready.ciphertext,
                ready.server_half,
            )
            .unwrap();
        ready.pointer
    }

    pub async fn put_leaf(&self, contents: &[u8]) -> BlockPointer {
        let writer = self.pipeline();
        self.put_with(&writer, &Block::leaf(contents.to_vec()), BlockContext::first_ref(alice()))
            .await
    }
}

/// Store whose `get` blocks until released
pub struct GatedStore {
    inner: Arc<MemoryBlockStore>,
    gate: Semaphore,
    pub entered: Notify,
    gets: AtomicUsize,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryBlockStore>) -> Self {
        GatedStore {
            inner,
            gate: Semaphore::new(0),
            entered: Notify::new(),
            gets: AtomicUsize::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1024);
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockStore for GatedStore {
    async fn get(
        &self,
        ctx: &RequestContext,
        collection: &CollectionId,
        id: &BlockId,
        context: &BlockContext,
    ) -> Result<(Vec<u8>, ServerHalf), StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        self.inner.get(ctx, collection, id, context).await
    }
}

/// Store that serves `ciphertext` for every id
pub struct TamperingStore {
    pub ciphertext: Vec<u8>,
}

#[async_trait]
impl BlockStore for TamperingStore {
    async fn get(
        &self,
        _ctx: &RequestContext,
        _collection: &CollectionId,
        _id: &BlockId,
        _context: &BlockContext,
    ) -> Result<(Vec<u8>, ServerHalf), StoreError> {
        Ok((self.ciphertext.clone(), ServerHalf::generate()))
    }
}

/// Store that always fails with the given error
pub struct FailingStore(pub StoreError);

#[async_trait]
impl BlockStore for FailingStore {
    async fn get(
        &self,
        _ctx: &RequestContext,
        _collection: &CollectionId,
        _id: &BlockId,
        _context: &BlockContext,
    ) -> Result<(Vec<u8>, ServerHalf), StoreError> {
        Err(self.0.clone())
    }
}

/// Bincode codec that counts decode calls
#[derive(Default)]
pub struct CountingCodec {
    inner: BincodeCodec,
    decodes: AtomicUsize,
}

impl CountingCodec {
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl Codec for CountingCodec {
    fn encode(&self, block: &Block) -> Result<Vec<u8>, CodecError> {
        self.inner.encode(block)
    }

    fn decode(&self, bytes: &[u8], data_type: DataType) -> Result<Block, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(bytes, data_type)
    }
}

/// Fatal-fault hook that records instead of acting
#[derive(Default)]
pub struct RecordingHook {
    faults: Mutex<Vec<FatalFault>>,
}

impl RecordingHook {
    pub fn faults(&self) -> Vec<FatalFault> {
        self.faults.lock().clone()
    }
}

impl FatalFaultHook for RecordingHook {
    fn on_fatal_fault(&self, fault: &FatalFault) {
        self.faults.lock().push(fault.clone());
    }
}
