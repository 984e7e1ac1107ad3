// FETCH INSTRUMENTATION
//
// Optional callbacks bracketing the two phases of a fetch: the store round
// trip, then verify/decrypt/decode. Observers must not block; they run
// inline on the fetching task.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::classifier::ErrorClass;
use crate::context::RequestContext;
use crate::errors::FetchError;
use crate::types::BlockPointer;

pub trait FetchObserver: Send + Sync {
    /// Before the block store call
    fn on_fetch_start(&self, _ctx: &RequestContext, _pointer: &BlockPointer) {}

    /// After the block store call; `Ok` carries the ciphertext length
    fn on_fetch_end(
        &self,
        _ctx: &RequestContext,
        _pointer: &BlockPointer,
        _outcome: Result<usize, &FetchError>,
    ) {
    }

    /// After verify, decrypt and decode; `None` on success
    fn on_assemble_end(
        &self,
        _ctx: &RequestContext,
        _pointer: &BlockPointer,
        _failure: Option<ErrorClass>,
    ) {
    }
}

/// Observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FetchObserver for NoopObserver {}

/// Emits one `tracing` debug event per phase boundary
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl FetchObserver for TracingObserver {
    fn on_fetch_start(&self, ctx: &RequestContext, pointer: &BlockPointer) {
        debug!(request_id = ctx.request_id(), block = %pointer.id, "getBlock start");
    }

    fn on_fetch_end(
        &self,
        ctx: &RequestContext,
        pointer: &BlockPointer,
        outcome: Result<usize, &FetchError>,
    ) {
        match outcome {
            Ok(len) => debug!(
                request_id = ctx.request_id(),
                block = %pointer.id,
                bytes = len,
                "getBlock end"
            ),
            Err(err) => debug!(
                request_id = ctx.request_id(),
                block = %pointer.id,
                error = %err,
                "getBlock failed"
            ),
        }
    }

    fn on_assemble_end(
        &self,
        ctx: &RequestContext,
        pointer: &BlockPointer,
        failure: Option<ErrorClass>,
    ) {
        debug!(
            request_id = ctx.request_id(),
            block = %pointer.id,
            failure = failure.map(|c| c.as_str()).unwrap_or("none"),
            "assembleBlock end"
        );
    }
}

/// Point-in-time copy of [`FetchCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCountersSnapshot {
    pub started: u64,
    pub store_failures: u64,
    pub assembled: u64,
    pub assemble_failures: u64,
    pub security_faults: u64,
}

/// Lock-free phase counters
#[derive(Debug, Default)]
pub struct FetchCounters {
    started: AtomicU64,
    store_failures: AtomicU64,
    assembled: AtomicU64,
    assemble_failures: AtomicU64,
    security_faults: AtomicU64,
}

impl FetchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FetchCountersSnapshot {
        FetchCountersSnapshot {
            started: self.started.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            assembled: self.assembled.load(Ordering::Relaxed),
            assemble_failures: self.assemble_failures.load(Ordering::Relaxed),
            security_faults: self.security_faults.load(Ordering::Relaxed),
        }
    }
}

impl FetchObserver for FetchCounters {
    fn on_fetch_start(&self, _ctx: &RequestContext, _pointer: &BlockPointer) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn on_fetch_end(
        &self,
        _ctx: &RequestContext,
        _pointer: &BlockPointer,
        outcome: Result<usize, &FetchError>,
    ) {
        if let Err(err) = outcome {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
            if err.is_security_fatal() {
                self.security_faults.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn on_assemble_end(
        &self,
        _ctx: &RequestContext,
        _pointer: &BlockPointer,
        failure: Option<ErrorClass>,
    ) {
        match failure {
            None => {
                self.assembled.fetch_add(1, Ordering::Relaxed);
            }
            Some(class) => {
                self.assemble_failures.fetch_add(1, Ordering::Relaxed);
                if class.is_security_fatal() {
                    self.security_faults.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
