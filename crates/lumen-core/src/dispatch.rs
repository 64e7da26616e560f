//! Callback contexts: single-threaded queues that results are delivered on.
//!
//! Background work in Lumen never calls user code directly. Instead it posts
//! a [`QueuedInvocation`] to a [`CallbackContext`], and the context runs the
//! invocation on the one thread it owns. In a GUI application that thread is
//! the UI thread; in a headless program or a test it can be a dedicated
//! [`DispatchThread`].
//!
//! # Owning the queue yourself
//!
//! ```
//! use lumen_core::{CallbackContext, DispatchQueue, QueuedInvocation};
//! use std::time::Duration;
//!
//! let queue = DispatchQueue::new();
//! let handle = queue.handle();
//!
//! std::thread::spawn(move || {
//!     handle.post(QueuedInvocation::new(|| println!("runs on the queue's thread"))).unwrap();
//! });
//!
//! // In your event loop:
//! queue.process_for(Duration::from_millis(50));
//! ```
//!
//! # Using a dedicated thread
//!
//! ```
//! use lumen_core::DispatchThread;
//!
//! let context = DispatchThread::spawn("ui").unwrap();
//! context.handle().invoke_blocking(|| println!("hello from the ui thread")).unwrap();
//! context.stop_and_join();
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use parking_lot::Mutex;

use crate::error::{CoreError, Result};
use crate::invocation::{QueuedInvocation, completion_pair};
use crate::logging::{span_names, targets};
use crate::thread_check::ThreadAffinity;

/// A single-threaded execution context that accepts invocations from any thread.
///
/// Implementations must run posted invocations one at a time, in the order
/// they were posted, on one fixed thread.
pub trait CallbackContext: Send + Sync {
    /// Queue an invocation for execution on the context's thread.
    fn post(&self, invocation: QueuedInvocation) -> Result<()>;

    /// Check whether the calling thread is the context's thread.
    fn is_context_thread(&self) -> bool;
}

impl<C: CallbackContext + ?Sized> CallbackContext for Arc<C> {
    fn post(&self, invocation: QueuedInvocation) -> Result<()> {
        (**self).post(invocation)
    }

    fn is_context_thread(&self) -> bool {
        (**self).is_context_thread()
    }
}

enum Message {
    Invoke(QueuedInvocation),
    Quit,
}

/// A FIFO queue of invocations drained by the thread that created it.
///
/// The creating thread becomes the context thread. Other threads reach the
/// queue through cloneable [`DispatchHandle`]s.
pub struct DispatchQueue {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    open: Arc<AtomicBool>,
    affinity: ThreadAffinity,
}

impl DispatchQueue {
    /// Create a queue owned by the current thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            open: Arc::new(AtomicBool::new(true)),
            affinity: ThreadAffinity::current(),
        }
    }

    /// Get a handle for posting to this queue from other threads.
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            sender: self.sender.clone(),
            open: self.open.clone(),
            affinity: self.affinity,
        }
    }

    /// Get the ID of the thread that owns this queue.
    pub fn thread_id(&self) -> ThreadId {
        self.affinity.thread_id()
    }

    /// Get the number of invocations waiting to run.
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Check whether the queue still accepts invocations.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Run every invocation that is already queued.
    ///
    /// Returns the number of invocations executed. A quit request is left
    /// for [`run`](Self::run) to observe.
    pub fn process_pending(&self) -> usize {
        self.affinity
            .assert_same_thread_with_msg("DispatchQueue drained off its owning thread");

        let mut processed = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(Message::Invoke(invocation)) => {
                    run_invocation(invocation);
                    processed += 1;
                }
                Ok(Message::Quit) => {
                    // Put the quit request back so a later `run` still exits.
                    let _ = self.sender.send(Message::Quit);
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        processed
    }

    /// Run invocations as they arrive until `timeout` has elapsed.
    ///
    /// Returns early on a quit request. Returns the number of invocations
    /// executed.
    pub fn process_for(&self, timeout: Duration) -> usize {
        self.affinity
            .assert_same_thread_with_msg("DispatchQueue drained off its owning thread");

        let deadline = Instant::now() + timeout;
        let mut processed = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(Message::Invoke(invocation)) => {
                    run_invocation(invocation);
                    processed += 1;
                }
                Ok(Message::Quit) => {
                    let _ = self.sender.send(Message::Quit);
                    break;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        processed
    }

    /// Run invocations until a quit request arrives.
    ///
    /// Returns the number of invocations executed.
    pub fn run(&self) -> usize {
        self.affinity
            .assert_same_thread_with_msg("DispatchQueue run off its owning thread");

        let _span =
            tracing::debug_span!(target: targets::DISPATCH, span_names::DISPATCH).entered();
        let mut processed = 0;
        while let Ok(message) = self.receiver.recv() {
            match message {
                Message::Invoke(invocation) => {
                    run_invocation(invocation);
                    processed += 1;
                }
                Message::Quit => break,
            }
        }
        processed
    }

    /// Stop accepting invocations and discard everything still queued.
    ///
    /// Discarded invocations release any waiter blocked on them.
    pub fn shutdown(&self) {
        self.open.store(false, Ordering::Release);
        let mut dropped = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            if let Message::Invoke(_) = message {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(target: targets::DISPATCH, dropped, "discarded queued invocations");
        }
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("thread", &self.affinity.thread_id())
            .field("pending", &self.pending_count())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Execute one invocation, containing panics so the context thread survives.
fn run_invocation(invocation: QueuedInvocation) {
    if panic::catch_unwind(AssertUnwindSafe(|| invocation.execute())).is_err() {
        crate::lumen_error!("queued invocation panicked on the callback context");
    }
}

/// A cloneable, thread-safe handle to a [`DispatchQueue`].
#[derive(Clone)]
pub struct DispatchHandle {
    sender: Sender<Message>,
    open: Arc<AtomicBool>,
    affinity: ThreadAffinity,
}

impl DispatchHandle {
    /// Post a closure for execution on the context thread.
    pub fn post_fn<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(QueuedInvocation::new(f))
    }

    /// Run a closure on the context thread and wait until it has finished.
    ///
    /// Called from the context thread itself, the closure runs inline.
    pub fn invoke_blocking<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.affinity.is_same_thread() {
            f();
            return Ok(());
        }

        let (handle, waiter) = completion_pair();
        self.post(QueuedInvocation::with_completion(f, handle))?;
        waiter.wait();
        Ok(())
    }

    /// Ask the context's run loop to return.
    pub fn quit(&self) {
        let _ = self.sender.send(Message::Quit);
    }

    /// Check whether the context still accepts invocations.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Get the ID of the context thread.
    pub fn thread_id(&self) -> ThreadId {
        self.affinity.thread_id()
    }
}

impl CallbackContext for DispatchHandle {
    fn post(&self, invocation: QueuedInvocation) -> Result<()> {
        if !self.is_open() {
            return Err(CoreError::ContextClosed);
        }
        self.sender
            .send(Message::Invoke(invocation))
            .map_err(|_| CoreError::ContextClosed)
    }

    fn is_context_thread(&self) -> bool {
        self.affinity.is_same_thread()
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("thread", &self.affinity.thread_id())
            .field("open", &self.is_open())
            .finish()
    }
}

/// A dedicated thread running a [`DispatchQueue`].
///
/// Useful as the callback context of headless programs and tests.
pub struct DispatchThread {
    handle: DispatchHandle,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchThread {
    /// Spawn a new context thread with the given name.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (handle_tx, handle_rx) = bounded(1);

        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            let queue = DispatchQueue::new();
            if handle_tx.send(queue.handle()).is_err() {
                return;
            }
            let processed = queue.run();
            tracing::debug!(target: targets::DISPATCH, processed, "dispatch thread exiting");
            queue.shutdown();
        })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| CoreError::ThreadSpawn(format!("dispatch thread '{name}' exited early")))?;

        Ok(Self {
            handle,
            join: Mutex::new(Some(join)),
        })
    }

    /// Get a handle for posting to this context.
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Get the ID of the context thread.
    pub fn thread_id(&self) -> ThreadId {
        self.handle.thread_id()
    }

    /// Wait until everything posted before this call has run.
    pub fn flush(&self) -> Result<()> {
        self.handle.invoke_blocking(|| {})
    }

    /// Stop the context thread and wait for it to exit.
    ///
    /// Invocations posted before the call still run. Returns `false` if the
    /// thread was already joined or panicked.
    pub fn stop_and_join(&self) -> bool {
        self.handle.quit();
        if self.handle.is_context_thread() {
            return false;
        }
        match self.join.lock().take() {
            Some(join) => join.join().is_ok(),
            None => false,
        }
    }
}

impl CallbackContext for DispatchThread {
    fn post(&self, invocation: QueuedInvocation) -> Result<()> {
        self.handle.post(invocation)
    }

    fn is_context_thread(&self) -> bool {
        self.handle.is_context_thread()
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl std::fmt::Debug for DispatchThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchThread")
            .field("thread", &self.thread_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_process_pending_runs_in_order() {
        let queue = DispatchQueue::new();
        let handle = queue.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            handle.post_fn(move || order.lock().push(i)).unwrap();
        }

        assert_eq!(queue.pending_count(), 5);
        assert_eq!(queue.process_pending(), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_post_from_other_thread() {
        let queue = DispatchQueue::new();
        let handle = queue.handle();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_on_clone = ran_on.clone();
        thread::spawn(move || {
            assert!(!handle.is_context_thread());
            handle
                .post_fn(move || *ran_on_clone.lock() = Some(thread::current().id()))
                .unwrap();
        })
        .join()
        .unwrap();

        queue.process_for(Duration::from_millis(50));
        assert_eq!(*ran_on.lock(), Some(thread::current().id()));
    }

    #[test]
    fn test_post_after_shutdown_fails() {
        let queue = DispatchQueue::new();
        let handle = queue.handle();
        queue.shutdown();

        assert!(!handle.is_open());
        assert_eq!(handle.post_fn(|| {}), Err(CoreError::ContextClosed));
    }

    #[test]
    fn test_post_after_drop_fails() {
        let handle = DispatchQueue::new().handle();
        assert_eq!(handle.post_fn(|| {}), Err(CoreError::ContextClosed));
    }

    #[test]
    fn test_shutdown_releases_blocked_poster() {
        let queue = DispatchQueue::new();
        let handle = queue.handle();

        let poster = thread::spawn(move || handle.invoke_blocking(|| {}));

        while queue.pending_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        queue.shutdown();

        assert!(poster.join().unwrap().is_ok());
    }

    #[test]
    fn test_invoke_blocking_inline_on_context_thread() {
        let queue = DispatchQueue::new();
        let handle = queue.handle();
        let ran = Arc::new(AtomicBool::new(false));

        let ran_clone = ran.clone();
        handle
            .invoke_blocking(move || ran_clone.store(true, Ordering::SeqCst))
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_panicking_invocation_does_not_stop_queue() {
        let queue = DispatchQueue::new();
        let handle = queue.handle();
        let counter = Arc::new(AtomicUsize::new(0));

        handle.post_fn(|| panic!("handler failure")).unwrap();
        let counter_clone = counter.clone();
        handle
            .post_fn(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(queue.process_pending(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_thread_runs_on_its_thread() {
        let context = DispatchThread::spawn("test-dispatch").unwrap();
        let name = Arc::new(Mutex::new(None));

        let name_clone = name.clone();
        context
            .handle()
            .invoke_blocking(move || {
                *name_clone.lock() = thread::current().name().map(str::to_owned);
            })
            .unwrap();

        assert_eq!(name.lock().as_deref(), Some("test-dispatch"));
        assert!(!context.is_context_thread());
        assert!(context.stop_and_join());
    }

    #[test]
    fn test_dispatch_thread_flush_and_stop() {
        let context = DispatchThread::spawn("test-flush").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            context
                .post(QueuedInvocation::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        context.flush().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);

        let handle = context.handle();
        assert!(context.stop_and_join());
        assert!(!context.stop_and_join());
        assert_eq!(handle.post_fn(|| {}), Err(CoreError::ContextClosed));
    }
}
