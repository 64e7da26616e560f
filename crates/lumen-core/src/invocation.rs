//! Queued invocations and completion signalling.
//!
//! A [`QueuedInvocation`] is a type-erased closure waiting to run on another
//! thread, typically the callback context. A [`completion_pair`] lets the
//! posting side block until some piece of work on another thread has ended.
//!
//! # How It Works
//!
//! 1. The producer wraps work in a closure and, when it needs to know that
//!    the work is over, attaches a [`CompletionHandle`].
//!
//! 2. The invocation travels to its target thread and is executed there.
//!
//! 3. The handle signals when it is dropped, which happens after the closure
//!    has run or when the invocation is discarded without running. A waiter
//!    therefore never blocks forever on work that was thrown away.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A type-erased queued invocation that can be executed later.
///
/// This wraps a closure that captures the callee and its arguments,
/// allowing deferred execution on the target thread.
pub struct QueuedInvocation {
    /// The actual invocation closure.
    invoke: Box<dyn FnOnce() + Send>,
    /// Optional completion notifier for blocking posts.
    completion: Option<CompletionHandle>,
}

impl QueuedInvocation {
    /// Create a new queued invocation.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// Create a new queued invocation with a completion handle for blocking.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Execute the invocation.
    pub fn execute(self) {
        (self.invoke)();
        // The completion handle, if any, signals as it drops here.
    }
}

impl std::fmt::Debug for QueuedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedInvocation")
            .field("blocking", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

struct CompletionState {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// The signalling half of a completion pair.
///
/// Signals completion exactly once: on [`CompletionHandle::signal_done`] or
/// when dropped, whichever happens first.
pub struct CompletionHandle {
    inner: Arc<CompletionState>,
}

impl CompletionHandle {
    /// Signal that the work is complete.
    pub fn signal_done(self) {
        // Drop does the work.
    }

    fn signal(&self) {
        let mut done = self.inner.done.lock();
        *done = true;
        self.inner.condvar.notify_all();
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        self.signal();
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle").finish_non_exhaustive()
    }
}

/// The waiting half of a completion pair.
///
/// Waiters can be cloned so several callers can wait on the same work.
#[derive(Clone)]
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Check whether completion has been signalled, without blocking.
    pub fn is_done(&self) -> bool {
        *self.inner.done.lock()
    }

    /// Wait for the work to complete.
    ///
    /// # Warning
    ///
    /// Waiting on the callback context for work that must itself run on the
    /// callback context will deadlock.
    pub fn wait(&self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.condvar.wait(&mut done);
        }
    }

    /// Wait for the work to complete with a timeout.
    ///
    /// Returns `true` if the work completed, `false` if the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut done = self.inner.done.lock();
        if *done {
            return true;
        }
        let _ = self
            .inner
            .condvar
            .wait_while_for(&mut done, |done| !*done, timeout);
        *done
    }
}

impl std::fmt::Debug for CompletionWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionWaiter")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Create a completion handle/waiter pair.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        done: Mutex::new(false),
        condvar: Condvar::new(),
    });

    (
        CompletionHandle {
            inner: state.clone(),
        },
        CompletionWaiter { inner: state },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_execute() {
        let executed = Arc::new(AtomicBool::new(false));

        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::new(move || {
            executed_clone.store(true, Ordering::SeqCst);
        });

        invocation.execute();
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_completion_pair() {
        let (handle, waiter) = completion_pair();

        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            handle.signal_done();
        });

        waiter.wait();
        assert!(waiter.is_done());
        thread.join().unwrap();
    }

    #[test]
    fn test_completion_with_invocation() {
        let executed = Arc::new(AtomicBool::new(false));
        let (handle, waiter) = completion_pair();

        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::with_completion(
            move || {
                executed_clone.store(true, Ordering::SeqCst);
            },
            handle,
        );

        let thread = std::thread::spawn(move || invocation.execute());

        waiter.wait();
        thread.join().unwrap();

        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_invocation_releases_waiter() {
        let (handle, waiter) = completion_pair();
        let invocation = QueuedInvocation::with_completion(|| {}, handle);

        assert!(!waiter.is_done());
        drop(invocation);
        assert!(waiter.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_completion_timeout() {
        let (_handle, waiter) = completion_pair();

        // Should timeout since we never signal
        let completed = waiter.wait_timeout(Duration::from_millis(10));
        assert!(!completed);
    }

    #[test]
    fn test_cloned_waiters() {
        let (handle, waiter) = completion_pair();
        let other = waiter.clone();

        drop(handle);
        assert!(waiter.is_done());
        assert!(other.is_done());
    }
}
