use rand::RngCore;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;

/// Per-request context: a random request id for log correlation, a
/// cancellation token, and an optional deadline
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

fn random_request_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl RequestContext {
    /// Context with no deadline
    pub fn new() -> Self {
        RequestContext {
            request_id: random_request_id(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline; a later deadline than the current one is ignored
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        });
        self
    }

    /// Derived context: canceled whenever the parent is, cancelable on its
    /// own without touching the parent
    pub fn child(&self) -> Self {
        RequestContext {
            request_id: self.request_id.clone(),
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The error this context resolves to, if it is already done
    pub fn err(&self) -> Option<FetchError> {
        if self.cancel.is_cancelled() {
            return Some(self.canceled());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(self.expired()),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes
    pub async fn done(&self) -> FetchError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => self.canceled(),
                _ = tokio::time::sleep_until(deadline) => self.expired(),
            },
            None => {
                self.cancel.cancelled().await;
                self.canceled()
            }
        }
    }

    /// Race `fut` against this context
    pub async fn run<F, T>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }

    fn canceled(&self) -> FetchError {
        FetchError::Canceled {
            request_id: self.request_id.clone(),
        }
    }

    fn expired(&self) -> FetchError {
        FetchError::DeadlineExceeded {
            request_id: self.request_id.clone(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
