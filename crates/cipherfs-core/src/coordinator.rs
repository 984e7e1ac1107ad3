// RETRIEVAL COORDINATOR
// Collapses concurrent requests for one block into a single pipeline fetch
// and fans the outcome out to every waiter.
//
// INVARIANTS:
// 1. At most one fetch is in flight per (collection, pointer)
// 2. The in-flight table lock is held only for bookkeeping, never across a fetch
// 3. A waiter leaving (cancel or deadline) never aborts the shared fetch
// 4. Every waiter still listening receives the identical outcome
// 5. A finished fetch always removes its table entry, even if its task panics
// 6. Waiters hold the classified result before the fatal-fault hook runs

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::block::Block;
use crate::context::RequestContext;
use crate::errors::{FetchError, FetchResult};
use crate::pipeline::BlockFetchPipeline;
use crate::types::{BlockPointer, CollectionId, KeyMetadata};

type Waiter = oneshot::Sender<FetchResult<Block>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    collection: CollectionId,
    pointer: BlockPointer,
}

struct InFlightRequest {
    waiters: Vec<Waiter>,
}

type InFlightTable = Arc<Mutex<HashMap<FetchKey, InFlightRequest>>>;

/// Removes the table entry and delivers the result when the shared fetch
/// ends. Dropped without a result, it still clears the entry and the
/// waiters observe `FetchError::Abandoned`.
struct CompletionGuard {
    in_flight: InFlightTable,
    key: FetchKey,
    completed: bool,
}

impl CompletionGuard {
    fn take_waiters(&self) -> Vec<Waiter> {
        self.in_flight
            .lock()
            .remove(&self.key)
            .map(|entry| entry.waiters)
            .unwrap_or_default()
    }

    fn complete(mut self, result: &FetchResult<Block>) {
        self.completed = true;
        let waiters = self.take_waiters();
        debug!(
            block = %self.key.pointer.id,
            waiters = waiters.len(),
            ok = result.is_ok(),
            "shared fetch complete"
        );
        for waiter in waiters {
            // A waiter that already left has dropped its receiver
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.completed {
            let waiters = self.take_waiters();
            debug!(block = %self.key.pointer.id, waiters = waiters.len(), "shared fetch abandoned");
        }
    }
}

/// Deduplicating front of a [`BlockFetchPipeline`]. Cheap to clone; clones
/// share one in-flight table.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    pipeline: Arc<BlockFetchPipeline>,
    in_flight: InFlightTable,
    fetch_timeout: Option<Duration>,
}

impl RetrievalCoordinator {
    pub fn new(pipeline: Arc<BlockFetchPipeline>) -> Self {
        RetrievalCoordinator {
            pipeline,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            fetch_timeout: None,
        }
    }

    /// Bound each shared fetch independently of any waiter's deadline
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn pipeline(&self) -> &Arc<BlockFetchPipeline> {
        &self.pipeline
    }

    /// Fetch `pointer`, joining an identical fetch already in flight.
    /// Returns once the shared fetch finishes or `ctx` is done, whichever is first.
    pub async fn request(
        &self,
        ctx: &RequestContext,
        md: &KeyMetadata,
        pointer: &BlockPointer,
    ) -> FetchResult<Block> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let key = FetchKey {
            collection: md.collection_id,
            pointer: pointer.clone(),
        };
        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get_mut(&key) {
                Some(entry) => {
                    entry.waiters.push(tx);
                    false
                }
                None => {
                    in_flight.insert(key.clone(), InFlightRequest { waiters: vec![tx] });
                    true
                }
            }
        };

        if leader {
            self.start_fetch(ctx, md.clone(), key);
        } else {
            debug!(request_id = ctx.request_id(), block = %pointer.id, "joined in-flight fetch");
        }

        tokio::select! {
            biased;
            delivered = rx => delivered.unwrap_or(Err(FetchError::Abandoned { id: pointer.id })),
            err = ctx.done() => {
                debug!(
                    request_id = ctx.request_id(),
                    block = %pointer.id,
                    "waiter left before fetch completed: {}",
                    err
                );
                Err(err)
            }
        }
    }

    // The fetch runs on its own context so no single waiter can cancel it
    fn start_fetch(&self, ctx: &RequestContext, md: KeyMetadata, key: FetchKey) {
        let fetch_ctx = match self.fetch_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::new(),
        };
        debug!(
            request_id = ctx.request_id(),
            fetch_request_id = fetch_ctx.request_id(),
            block = %key.pointer.id,
            "starting shared fetch"
        );

        let pipeline = self.pipeline.clone();
        let pointer = key.pointer.clone();
        let guard = CompletionGuard {
            in_flight: self.in_flight.clone(),
            key,
            completed: false,
        };
        tokio::spawn(async move {
            let result = pipeline.fetch_unreported(&fetch_ctx, &md, &pointer).await;
            guard.complete(&result);
            // every waiter already holds the result when the hook runs
            if let Err(err) = &result {
                pipeline.report(&fetch_ctx, &md, &pointer, err);
            }
        });
    }

    /// Number of distinct fetches currently in flight
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Waiters registered on the in-flight fetch of `pointer`, if any
    pub fn waiter_count(&self, collection: &CollectionId, pointer: &BlockPointer) -> usize {
        let key = FetchKey {
            collection: *collection,
            pointer: pointer.clone(),
        };
        self.in_flight
            .lock()
            .get(&key)
            .map(|entry| entry.waiters.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_store::MemoryBlockStore;
    use crate::key_deriver::Keyring;
    use crate::types::{BlockContext, DataType, KeyGen, UserId};
    use cipherfs_crypto::BlockId;

    fn coordinator() -> RetrievalCoordinator {
        let pipeline =
            BlockFetchPipeline::new(Arc::new(MemoryBlockStore::new()), Arc::new(Keyring::new()));
        RetrievalCoordinator::new(Arc::new(pipeline))
    }

    fn missing_pointer() -> BlockPointer {
        BlockPointer {
            id: BlockId::for_ciphertext(b"never stored"),
            key_gen: KeyGen(1),
            data_type: DataType::Leaf,
            context: BlockContext::first_ref(UserId::new("alice")),
        }
    }

    #[tokio::test]
    async fn test_done_context_never_registers() {
        let coordinator = coordinator();
        let ctx = RequestContext::new();
        ctx.cancel();
        let md = KeyMetadata::new(CollectionId::default(), KeyGen(1));

        let err = coordinator.request(&ctx, &md, &missing_pointer()).await.unwrap_err();
        assert!(matches!(err, FetchError::Canceled { .. }));
        assert_eq!(coordinator.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_entry_removed_after_failure() {
        let coordinator = coordinator();
        let md = KeyMetadata::new(CollectionId::default(), KeyGen(1));

        let err = coordinator
            .request(&RequestContext::new(), &md, &missing_pointer())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Store(_)));
        assert_eq!(coordinator.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_guard_abandons_waiters() {
        let coordinator = coordinator();
        let key = FetchKey {
            collection: CollectionId::default(),
            pointer: missing_pointer(),
        };
        let (tx, rx) = oneshot::channel();
        coordinator
            .in_flight
            .lock()
            .insert(key.clone(), InFlightRequest { waiters: vec![tx] });

        drop(CompletionGuard {
            in_flight: coordinator.in_flight.clone(),
            key,
            completed: false,
        });
        assert!(rx.await.is_err());
        assert_eq!(coordinator.in_flight_len(), 0);
    }
}
