//! Transport adapters: interchangeable ways of receiving a job's progress.
//!
//! Every strategy reports through a [`ProgressSink`] and is owned through a
//! [`TransportHandle`]. Disposing the handle cancels the strategy's task and
//! silences its sink, so no callback is delivered after `dispose` returns.

mod poll;
mod push;
mod sse;
mod upload;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tokio_util::sync::CancellationToken;

use crate::TransportError;

pub use poll::PollingStrategy;
pub use push::PushStrategy;
pub use sse::SseDecoder;
pub use upload::{UploadObserver, UploadStrategy};

/// Consumer side of a transport.
pub trait ProgressSink: Send + Sync {
    /// One raw progress payload, exactly as received.
    fn on_update(&self, raw: String);
    /// The channel is unusable. Called at most once per guarded sink.
    fn on_error(&self, error: TransportError);
}

/// A long-running progress channel (polling or push).
#[async_trait::async_trait]
pub trait ProgressSource: Send + Sync {
    /// Runs until cancelled or until the channel fails; failures are
    /// reported through `sink`.
    async fn run(&self, session: &str, sink: &dyn ProgressSink, cancel: CancellationToken);
}

/// Owning handle to one running strategy.
#[derive(Debug, Clone, Default)]
pub struct TransportHandle {
    token: CancellationToken,
    disposed: Arc<AtomicBool>,
    /// Held shared while a callback is delivered, exclusively by `dispose`.
    gate: Arc<RwLock<()>>,
}

impl TransportHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the strategy. Idempotent and safe after the channel closed itself.
    /// Waits for a callback that is being delivered right now.
    pub fn dispose(&self) {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.token.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Both handles control the same strategy.
    pub fn same_as(&self, other: &TransportHandle) -> bool {
        Arc::ptr_eq(&self.disposed, &other.disposed)
    }

    /// Guard to hold while delivering a callback; `dispose` waits for it.
    pub(crate) fn deliver(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wraps `sink` so it goes quiet once this handle is disposed.
    pub fn guard<S: ProgressSink>(&self, sink: S) -> GuardedSink<S> {
        GuardedSink {
            inner: sink,
            handle: self.clone(),
        }
    }
}

pub struct GuardedSink<S> {
    inner: S,
    handle: TransportHandle,
}

impl<S: ProgressSink> ProgressSink for GuardedSink<S> {
    fn on_update(&self, raw: String) {
        let _gate = self.handle.deliver();
        if !self.handle.is_disposed() {
            self.inner.on_update(raw);
        }
    }

    fn on_error(&self, error: TransportError) {
        // A fatal error closes the channel; later errors are dropped.
        let _gate = self.handle.deliver();
        if !self.handle.disposed.swap(true, Ordering::SeqCst) {
            self.handle.token.cancel();
            self.inner.on_error(error);
        }
    }
}
