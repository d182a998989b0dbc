//! Request coordination
//!
//! Tracks how many SDK operations are in flight and remembers the most
//! recent failure, for UIs that want a busy indicator and an error banner.
//! Observation only: every error is still returned to its caller, and
//! nothing is retried or queued here.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;

use fhevm_core::{FhevmError, Result};

/// SDK operation classes, as reported in [`OperationEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Init,
    Encrypt,
    UserDecrypt,
    PublicDecrypt,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Init => "init",
            Operation::Encrypt => "encrypt",
            Operation::UserDecrypt => "user_decrypt",
            Operation::PublicDecrypt => "public_decrypt",
        };
        f.write_str(name)
    }
}

/// Lifecycle notifications emitted around every coordinated operation.
#[derive(Debug, Clone)]
pub enum OperationEvent {
    Started { operation: Operation },
    Finished { operation: Operation },
    Failed { operation: Operation, error: FhevmError },
}

/// Busy and error bookkeeping around SDK operations.
pub struct RequestCoordinator {
    in_flight: AtomicUsize,
    last_error: ArcSwapOption<FhevmError>,
    events: broadcast::Sender<OperationEvent>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        RequestCoordinator {
            in_flight: AtomicUsize::new(0),
            last_error: ArcSwapOption::const_empty(),
            events,
        }
    }

    /// Run `fut` with busy tracking. The result passes through unchanged;
    /// a failure is additionally recorded as the last error.
    pub async fn run<T, F>(&self, operation: Operation, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let _ = self.events.send(OperationEvent::Started { operation });

        let result = fut.await;

        match &result {
            Ok(_) => {
                let _ = self.events.send(OperationEvent::Finished { operation });
            }
            Err(error) => {
                tracing::warn!(%operation, error = %error, "operation failed");
                self.last_error.store(Some(Arc::new(error.clone())));
                let _ = self.events.send(OperationEvent::Failed {
                    operation,
                    error: error.clone(),
                });
            }
        }
        result
    }

    /// True while any coordinated operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most recent failure, kept until cleared or overwritten.
    pub fn last_error(&self) -> Option<Arc<FhevmError>> {
        self.last_error.load_full()
    }

    pub fn clear_error(&self) {
        self.last_error.store(None);
    }

    /// Subscribe to operation lifecycle events. Slow receivers miss events
    /// rather than blocking operations.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.events.subscribe()
    }
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter on drop, so a panicking future cannot
/// leave the coordinator stuck busy.
struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
