// RETRIEVAL COORDINATOR INTEGRATION TESTS
// Request collapsing, result fan-out, per-waiter cancellation
//
// Test Categories:
// 1. Deduplication - one store call per concurrent burst on one pointer
// 2. Fan-out - every waiter sees the same value or the same error
// 3. Cancellation - leaving waiters never disturb the shared fetch
// 4. Table hygiene - entries disappear once a fetch ends, however it ends
// 5. Fatal faults - waiters get the classified error, the hook runs once

mod common;

use cipherfs_core::{
    Block, BlockFetchPipeline, BlockPointer, ErrorClass, FetchError, FetchResult, KeyMetadata,
    MemoryBlockStore, PanicOnFatalFault, RequestContext, RetrievalCoordinator,
};
use cipherfs_crypto::ServerHalf;
use common::{Fixture, GatedStore, RecordingHook, TamperingStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Harness {
    fx: Fixture,
    gated: Arc<GatedStore>,
    coordinator: RetrievalCoordinator,
}

impl Harness {
    fn new() -> Self {
        let fx = Fixture::new();
        let gated = Arc::new(GatedStore::new(fx.store.clone()));
        let pipeline = BlockFetchPipeline::new(gated.clone(), fx.keyring.clone());
        let coordinator = RetrievalCoordinator::new(Arc::new(pipeline));
        Harness { fx, gated, coordinator }
    }

    fn spawn_request(
        &self,
        ctx: RequestContext,
        pointer: &BlockPointer,
    ) -> JoinHandle<FetchResult<Block>> {
        spawn_request(&self.coordinator, ctx, self.fx.md.clone(), pointer.clone())
    }

    async fn wait_for_waiters(&self, pointer: &BlockPointer, n: usize) {
        while self.coordinator.waiter_count(&self.fx.collection, pointer) < n {
            tokio::task::yield_now().await;
        }
    }
}

fn spawn_request(
    coordinator: &RetrievalCoordinator,
    ctx: RequestContext,
    md: KeyMetadata,
    pointer: BlockPointer,
) -> JoinHandle<FetchResult<Block>> {
    let coordinator = coordinator.clone();
    tokio::spawn(async move { coordinator.request(&ctx, &md, &pointer).await })
}

// ============================================================================
// DEDUPLICATION
// ============================================================================

#[tokio::test]
async fn test_two_concurrent_requests_share_one_get() {
    let h = Harness::new();
    let pointer = h.fx.put_leaf(b"shared").await;

    let first = h.spawn_request(RequestContext::new(), &pointer);
    h.gated.entered.notified().await;
    let second = h.spawn_request(RequestContext::new(), &pointer);
    h.wait_for_waiters(&pointer, 2).await;
    assert_eq!(h.coordinator.in_flight_len(), 1);

    h.gated.release();
    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a, Block::leaf(b"shared".to_vec()));
    assert_eq!(a, b);
    assert_eq!(h.gated.get_count(), 1);
    assert_eq!(h.coordinator.in_flight_len(), 0);
}

#[tokio::test]
async fn test_burst_of_requests_delivers_equal_results() {
    const N: usize = 32;
    let h = Harness::new();
    let pointer = h.fx.put_leaf(b"burst").await;

    let handles: Vec<_> = (0..N)
        .map(|_| h.spawn_request(RequestContext::new(), &pointer))
        .collect();
    h.wait_for_waiters(&pointer, N).await;
    h.gated.release();

    let mut results = Vec::with_capacity(N);
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert!(results.iter().all(|b| *b == results[0]));
    assert_eq!(h.gated.get_count(), 1);
}

#[tokio::test]
async fn test_distinct_pointers_fetch_separately() {
    let h = Harness::new();
    let p1 = h.fx.put_leaf(b"one").await;
    let p2 = h.fx.put_leaf(b"two").await;

    let a = h.spawn_request(RequestContext::new(), &p1);
    let b = h.spawn_request(RequestContext::new(), &p2);
    h.wait_for_waiters(&p1, 1).await;
    h.wait_for_waiters(&p2, 1).await;
    assert_eq!(h.coordinator.in_flight_len(), 2);

    h.gated.release();
    assert_eq!(a.await.unwrap().unwrap(), Block::leaf(b"one".to_vec()));
    assert_eq!(b.await.unwrap().unwrap(), Block::leaf(b"two".to_vec()));
    assert_eq!(h.gated.get_count(), 2);
}

#[tokio::test]
async fn test_completed_fetch_is_not_reused() {
    let h = Harness::new();
    let pointer = h.fx.put_leaf(b"again").await;
    h.gated.release();

    for _ in 0..2 {
        h.coordinator
            .request(&RequestContext::new(), &h.fx.md, &pointer)
            .await
            .unwrap();
    }
    assert_eq!(h.gated.get_count(), 2);
    assert_eq!(h.coordinator.in_flight_len(), 0);
}

// ============================================================================
// FAN-OUT OF FAILURES
// ============================================================================

#[tokio::test]
async fn test_error_delivered_to_every_waiter() {
    let h = Harness::new();
    let mut missing = h.fx.put_leaf(b"present").await;
    missing.id = cipherfs_crypto::BlockId::for_ciphertext(b"absent");

    let first = h.spawn_request(RequestContext::new(), &missing);
    let second = h.spawn_request(RequestContext::new(), &missing);
    h.wait_for_waiters(&missing, 2).await;
    h.gated.release();

    let a = first.await.unwrap().unwrap_err();
    let b = second.await.unwrap().unwrap_err();
    assert_eq!(a, b);
    assert_eq!(a.class(), ErrorClass::Transient);
    assert_eq!(h.gated.get_count(), 1);
}

#[tokio::test]
async fn test_panicking_hook_leaves_waiters_with_integrity_failure() {
    let fx = Fixture::new();
    let pointer = fx.put_leaf(b"victim").await;
    let pipeline = BlockFetchPipeline::new(
        Arc::new(TamperingStore {
            ciphertext: b"forged".to_vec(),
        }),
        fx.keyring.clone(),
    )
    .with_fault_hook(Arc::new(PanicOnFatalFault));
    let coordinator = RetrievalCoordinator::new(Arc::new(pipeline));

    let err = coordinator
        .request(&RequestContext::new(), &fx.md, &pointer)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HashMismatch { expected, .. } if expected == pointer.id));
    assert_eq!(err.class(), ErrorClass::IntegrityFailure);
    assert!(!err.class().is_retryable());
    assert_eq!(coordinator.in_flight_len(), 0);
}

#[tokio::test]
async fn test_shared_fatal_fault_reported_once() {
    let fx = Fixture::new();
    let pointer = fx.put_leaf(b"victim").await;
    // forged bytes served under the genuine id
    let forged = Arc::new(MemoryBlockStore::new());
    forged
        .put(
            fx.collection,
            pointer.id,
            &pointer.context,
            b"forged".to_vec(),
            ServerHalf::generate(),
        )
        .unwrap();
    let gated = Arc::new(GatedStore::new(forged));
    let hook = Arc::new(RecordingHook::default());
    let pipeline =
        BlockFetchPipeline::new(gated.clone(), fx.keyring.clone()).with_fault_hook(hook.clone());
    let coordinator = RetrievalCoordinator::new(Arc::new(pipeline));

    let first = spawn_request(&coordinator, RequestContext::new(), fx.md.clone(), pointer.clone());
    let second = spawn_request(&coordinator, RequestContext::new(), fx.md.clone(), pointer.clone());
    while coordinator.waiter_count(&fx.collection, &pointer) < 2 {
        tokio::task::yield_now().await;
    }
    gated.release();

    for handle in [first, second] {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.class(), ErrorClass::IntegrityFailure);
    }
    while hook.faults().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(hook.faults().len(), 1);
    assert_eq!(hook.faults()[0].class, ErrorClass::IntegrityFailure);
    assert_eq!(gated.get_count(), 1);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_canceled_waiter_does_not_disturb_others() {
    let h = Harness::new();
    let pointer = h.fx.put_leaf(b"survivor").await;

    let leaving = RequestContext::new();
    let first = h.spawn_request(leaving.clone(), &pointer);
    let second = h.spawn_request(RequestContext::new(), &pointer);
    h.wait_for_waiters(&pointer, 2).await;

    leaving.cancel();
    let canceled = first.await.unwrap().unwrap_err();
    assert!(matches!(canceled, FetchError::Canceled { .. }));
    // the shared fetch is still pending
    assert_eq!(h.coordinator.in_flight_len(), 1);

    h.gated.release();
    assert_eq!(second.await.unwrap().unwrap(), Block::leaf(b"survivor".to_vec()));
    assert_eq!(h.gated.get_count(), 1);
}

#[tokio::test]
async fn test_initiator_cancel_keeps_fetch_alive() {
    let h = Harness::new();
    let pointer = h.fx.put_leaf(b"initiator left").await;

    let initiator = RequestContext::new();
    let first = h.spawn_request(initiator.clone(), &pointer);
    h.gated.entered.notified().await;
    let second = h.spawn_request(RequestContext::new(), &pointer);
    h.wait_for_waiters(&pointer, 2).await;

    initiator.cancel();
    assert!(first.await.unwrap().is_err());

    h.gated.release();
    assert!(second.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_expired_waiter_leaves_with_deadline_error() {
    let h = Harness::new();
    let pointer = h.fx.put_leaf(b"slow").await;

    let hurried =
        h.spawn_request(RequestContext::with_timeout(Duration::from_millis(50)), &pointer);
    let patient = h.spawn_request(RequestContext::new(), &pointer);
    h.wait_for_waiters(&pointer, 2).await;

    let err = hurried.await.unwrap().unwrap_err();
    assert!(matches!(err, FetchError::DeadlineExceeded { .. }));

    h.gated.release();
    assert_eq!(patient.await.unwrap().unwrap(), Block::leaf(b"slow".to_vec()));
}
