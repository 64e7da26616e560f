//! Thread affinity checks.
//!
//! A callback context owns exactly one thread. Work that must happen on that
//! thread, such as draining a [`DispatchQueue`](crate::DispatchQueue), records
//! a [`ThreadAffinity`] when it is created and checks it on every entry.
//!
//! ```
//! use lumen_core::thread_check::ThreadAffinity;
//!
//! struct Counter {
//!     affinity: ThreadAffinity,
//!     value: std::cell::Cell<i32>,
//! }
//!
//! impl Counter {
//!     fn bump(&self) {
//!         // In debug builds, panic if called from the wrong thread
//!         self.affinity.debug_assert_same_thread();
//!         self.value.set(self.value.get() + 1);
//!     }
//! }
//!
//! let counter = Counter { affinity: ThreadAffinity::current(), value: Default::default() };
//! counter.bump();
//! assert_eq!(counter.value.get(), 1);
//! ```

use std::thread::ThreadId;

/// Records the thread an object belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Create a new thread affinity tracker for the current thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Get the thread ID this affinity is bound to.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Check if the current thread matches this affinity.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Panic if the current thread does not match this affinity.
    #[track_caller]
    pub fn assert_same_thread(&self) {
        self.assert_same_thread_with_msg("object accessed from a foreign thread");
    }

    /// Panic with a custom message if the current thread does not match.
    #[track_caller]
    pub fn assert_same_thread_with_msg(&self, msg: &str) {
        if !self.is_same_thread() {
            panic_affinity_violation(msg, self.thread_id);
        }
    }

    /// Like [`assert_same_thread`](Self::assert_same_thread), but only in debug builds.
    #[inline]
    #[track_caller]
    pub fn debug_assert_same_thread(&self) {
        #[cfg(debug_assertions)]
        self.assert_same_thread();
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn panic_affinity_violation(msg: &str, expected: ThreadId) -> ! {
    let current = std::thread::current();
    panic!(
        "Thread affinity violation: {msg}\n  expected thread: {expected:?}\n  current thread: {:?} ({})",
        current.id(),
        current.name().unwrap_or("<unnamed>"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_thread_affinity_same_thread() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        assert_eq!(affinity.thread_id(), std::thread::current().id());
        // Should not panic
        affinity.assert_same_thread();
        affinity.debug_assert_same_thread();
    }

    #[test]
    fn test_thread_affinity_different_thread() {
        let affinity = ThreadAffinity::current();

        let result = Arc::new(AtomicBool::new(false));
        let result_clone = result.clone();

        std::thread::spawn(move || {
            result_clone.store(!affinity.is_same_thread(), Ordering::SeqCst);
        })
        .join()
        .unwrap();

        assert!(result.load(Ordering::SeqCst));
    }

    #[test]
    fn test_thread_affinity_panic_on_wrong_thread() {
        let affinity = ThreadAffinity::current();

        let result = std::thread::spawn(move || {
            affinity.assert_same_thread_with_msg("queue drained off-thread");
        })
        .join();

        assert!(result.is_err(), "Expected thread to panic with affinity violation");
    }
}
