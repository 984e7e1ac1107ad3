// ERROR CLASSIFIER
// Maps every fetch failure onto the five-way taxonomy callers act on.
//
// INVARIANTS:
// 1. Every FetchError has exactly one class
// 2. IntegrityFailure and ProtocolViolation are security-fatal and are never
//    reported as retryable
// 3. Only Transient failures are retryable

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

use crate::errors::{FetchError, StoreError};
use crate::types::{BlockPointer, CollectionId};

/// Category of a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Caller may retry with its own backoff
    Transient,
    /// Terminal without new key material
    AccessDenied,
    /// Verified-corrupt or forged block
    IntegrityFailure,
    /// A request this engine made, or was asked to make, was malformed
    ProtocolViolation,
    /// Authenticated bytes that do not decode; a data or logic defect
    DecodeFailure,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "TRANSIENT",
            ErrorClass::AccessDenied => "ACCESS_DENIED",
            ErrorClass::IntegrityFailure => "INTEGRITY_FAILURE",
            ErrorClass::ProtocolViolation => "PROTOCOL_VIOLATION",
            ErrorClass::DecodeFailure => "DECODE_FAILURE",
        }
    }

    pub fn is_security_fatal(&self) -> bool {
        matches!(self, ErrorClass::IntegrityFailure | ErrorClass::ProtocolViolation)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a fetch failure
pub fn classify(err: &FetchError) -> ErrorClass {
    match err {
        FetchError::Store(StoreError::BadRequest(_)) => ErrorClass::ProtocolViolation,
        FetchError::Store(_) => ErrorClass::Transient,
        FetchError::MalformedRequest { .. } | FetchError::InvalidPointer { .. } => {
            ErrorClass::ProtocolViolation
        }
        FetchError::HashMismatch { .. }
        | FetchError::ContextMismatch { .. }
        | FetchError::DecryptionFailed { .. } => ErrorClass::IntegrityFailure,
        FetchError::AccessDenied { .. } => ErrorClass::AccessDenied,
        FetchError::Decode { .. } | FetchError::Encode { .. } => ErrorClass::DecodeFailure,
        FetchError::Canceled { .. }
        | FetchError::DeadlineExceeded { .. }
        | FetchError::Abandoned { .. } => ErrorClass::Transient,
    }
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        classify(self)
    }

    pub fn is_security_fatal(&self) -> bool {
        self.class().is_security_fatal()
    }
}

// ==================== FATAL FAULT HOOK ====================

/// Report handed to the embedding application for a security-fatal failure
#[derive(Debug, Clone)]
pub struct FatalFault {
    pub class: ErrorClass,
    pub collection_id: CollectionId,
    pub pointer: BlockPointer,
    pub error: FetchError,
}

impl fmt::Display for FatalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in collection {} for {}: {}",
            self.class, self.collection_id, self.pointer, self.error
        )
    }
}

/// Decides what happens to the process after a security-fatal failure.
/// The failure is still returned to the caller after the hook runs.
pub trait FatalFaultHook: Send + Sync {
    fn on_fatal_fault(&self, fault: &FatalFault);
}

/// Logs the fault at error level and lets operation continue
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFatalFaults;

impl FatalFaultHook for LogFatalFaults {
    fn on_fatal_fault(&self, fault: &FatalFault) {
        error!(
            class = fault.class.as_str(),
            collection = %fault.collection_id,
            block = %fault.pointer.id,
            "security-fatal block fault: {}",
            fault.error
        );
    }
}

/// Logs, then panics in the task that reported the fault. Behind a
/// `RetrievalCoordinator` that is the detached fetch task: waiters already
/// hold the classified error and the rest of the process keeps running.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicOnFatalFault;

impl FatalFaultHook for PanicOnFatalFault {
    fn on_fatal_fault(&self, fault: &FatalFault) {
        LogFatalFaults.on_fatal_fault(fault);
        panic!("security-fatal block fault detected: {}", fault);
    }
}

/// Logs, then aborts the whole process
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnFatalFault;

impl FatalFaultHook for AbortOnFatalFault {
    fn on_fatal_fault(&self, fault: &FatalFault) {
        LogFatalFaults.on_fatal_fault(fault);
        error!("aborting after security-fatal block fault: {}", fault);
        std::process::abort();
    }
}

/// Configurable choice of built-in hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalFaultPolicy {
    #[default]
    Log,
    Panic,
    Abort,
}

impl FatalFaultPolicy {
    pub fn build(self) -> std::sync::Arc<dyn FatalFaultHook> {
        match self {
            FatalFaultPolicy::Log => std::sync::Arc::new(LogFatalFaults),
            FatalFaultPolicy::Panic => std::sync::Arc::new(PanicOnFatalFault),
            FatalFaultPolicy::Abort => std::sync::Arc::new(AbortOnFatalFault),
        }
    }
}
