//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cancellation token for cooperative task cancellation.
///
/// Cancellation tokens allow signaling that a task should stop its work.
/// Tasks must periodically check the token and exit gracefully when cancelled.
/// Clones share the same flag.
///
/// # Example
///
/// ```
/// use lumen_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// let handle = std::thread::spawn(move || {
///     let mut steps = 0;
///     while !worker_token.is_cancelled() && steps < 1_000 {
///         steps += 1;
///         std::thread::yield_now();
///     }
///     steps
/// });
///
/// token.cancel();
/// assert!(handle.join().unwrap() <= 1_000);
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// Returns `true` if this call flipped the flag, `false` if the token was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        assert!(token.cancel());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_twice() {
        let token = CancellationToken::new();
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_distinct_tokens() {
        let a = CancellationToken::new();
        let b = CancellationToken::default();
        a.cancel();
        assert!(!b.is_cancelled());
    }
}
