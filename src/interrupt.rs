//! A user interrupt shared between the Ctrl-C handler and whatever is in flight.
//!
//! The signal side only ever calls [`Interrupt::trigger`]. Async work that must stop promptly
//! is wrapped in [`Interrupt::race`]; the stream loop polls [`Interrupt::is_triggered`]
//! between chunks.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

/// A cloneable interrupt flag that async code can also wait on.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt and wake every waiter. Safe to call from any thread.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Clear the interrupt, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.inner.triggered.swap(false, Ordering::SeqCst)
    }

    /// Resolves once the interrupt is raised; immediately if it already is.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a trigger between the two is not missed.
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Run `future` to completion unless the interrupt is raised first.
    ///
    /// A future that is already complete wins over a pending interrupt. An interrupted
    /// future is dropped and the result is [`Error::Abort`].
    pub async fn race<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            result = future => result,
            () = self.wait() => Err(Error::abort("interrupted")),
        }
    }
}
