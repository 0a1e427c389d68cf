//! Process-wide cancellation latch.
//!
//! The [`InterruptToken`] is a single-producer, many-consumer latch: the
//! top-level interrupt handler sets it once, and every loop and cooperative
//! sleep in the pipeline, the EPrints client, and the archive drivers
//! observes it. Once set it is never reset.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use eprints2archives_core::interrupt::InterruptToken;
//!
//! # async fn example() {
//! let token = InterruptToken::new();
//!
//! // A waiting task returns early once the token is set.
//! let waiter = token.clone();
//! tokio::spawn(async move { waiter.wait(Duration::from_secs(300)).await });
//!
//! token.set();
//! assert!(token.raise_if_set().is_err());
//! # }
//! ```

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

/// Error returned by waits and checks once the token has been set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation interrupted by user")]
pub struct Cancelled;

/// A cloneable cancellation latch shared by every component of a run.
///
/// Clones observe the same underlying state. Setting is idempotent.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    set: AtomicBool,
    notify: Notify,
}

impl InterruptToken {
    /// Creates a fresh, unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the token, waking every pending [`wait`](Self::wait).
    pub fn set(&self) {
        if !self.inner.set.swap(true, Ordering::SeqCst) {
            debug!("interrupt token set");
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns whether the token has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    /// Returns [`Cancelled`] if the token has been set.
    pub fn raise_if_set(&self) -> Result<(), Cancelled> {
        if self.is_set() { Err(Cancelled) } else { Ok(()) }
    }

    /// Sleeps up to `duration`, returning [`Cancelled`] as soon as the token
    /// is set.
    ///
    /// All retry, back-off, and rate-limit pauses go through this method so
    /// that a user interrupt cuts every sleep short.
    pub async fn wait(&self, duration: Duration) -> Result<(), Cancelled> {
        let mut notified = pin!(self.inner.notify.notified());
        // Register for wakeups before checking the flag, so a set() racing
        // with this wait cannot be missed.
        notified.as_mut().enable();
        if self.is_set() {
            return Err(Cancelled);
        }
        tokio::select! {
            () = &mut notified => Err(Cancelled),
            () = tokio::time::sleep(duration) => self.raise_if_set(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_new_token_is_unset() {
        let token = InterruptToken::new();
        assert!(!token.is_set());
        assert!(token.raise_if_set().is_ok());
    }

    #[test]
    fn test_set_is_idempotent_and_visible_to_clones() {
        let token = InterruptToken::new();
        let other = token.clone();
        token.set();
        token.set();
        assert!(token.is_set());
        assert!(other.is_set());
        assert_eq!(other.raise_if_set(), Err(Cancelled));
    }

    #[tokio::test]
    async fn test_wait_completes_when_unset() {
        let token = InterruptToken::new();
        let result = token.wait(Duration::from_millis(10)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_set() {
        let token = InterruptToken::new();
        token.set();
        let start = Instant::now();
        let result = token.wait(Duration::from_secs(60)).await;
        assert_eq!(result, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_is_cut_short_by_set() {
        let token = InterruptToken::new();
        let waiter = token.clone();
        let handle =
            tokio::spawn(async move { waiter.wait(Duration::from_secs(60)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let start = Instant::now();
        token.set();

        let result = handle.await.unwrap();
        assert_eq!(result, Err(Cancelled));
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "wait should return within the latency bound after set()"
        );
    }
}
