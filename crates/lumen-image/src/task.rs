//! Interruptible background image loading.
//!
//! An [`ImageLoadTask`] owns one "current image" slot. Each
//! [`submit`](ImageLoadTask::submit) replaces whatever was being loaded
//! before: the older load is cancelled and its result, should it still be
//! produced, is thrown away. Only the newest source ever reaches the handler.
//!
//! # How It Works
//!
//! 1. `submit` cancels every outstanding load and puts the new submission in
//!    a one-slot [`Mailbox`]. A submission that was still waiting there is
//!    simply replaced.
//!
//! 2. A single worker thread takes submissions from the mailbox one at a
//!    time. The source is read through a [`CancellableReader`], so once a
//!    load is cancelled the decoder sees end-of-data and stops early.
//!
//! 3. If the load is still current when decoding ends, the result is posted
//!    to the callback context. The posted closure checks the cancellation
//!    token again before calling the handler, so a result that was queued
//!    but had not run yet is dropped once a newer submission arrives. The
//!    token of the latest submission stays cancellable after its round
//!    ends for exactly this reason.
//!
//! 4. Every submission carries a completion handle that signals when its
//!    round is over, or when the submission is dropped unprocessed.
//!    [`cancel_current`](ImageLoadTask::cancel_current) and
//!    [`dispose`](ImageLoadTask::dispose) block on those signals.
//!
//! # Example
//!
//! ```no_run
//! use lumen_core::DispatchThread;
//! use lumen_image::{ImageLoadTask, ImageSource, handler_fn};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ui = DispatchThread::spawn("ui")?;
//!
//! let task = ImageLoadTask::new(
//!     ui.handle(),
//!     handler_fn(
//!         |ticket, image| println!("{ticket:?}: {}x{}", image.width(), image.height()),
//!         |ticket, error| eprintln!("{ticket:?} failed: {error}"),
//!     ),
//! );
//!
//! task.submit(ImageSource::open("first.png")?)?;
//! // The user moved on before the first image finished: only this one is shown.
//! task.submit(ImageSource::open("second.png")?)?;
//!
//! task.dispose();
//! # Ok(())
//! # }
//! ```
//!
//! [`Mailbox`]: lumen_core::Mailbox
//! [`CancellableReader`]: crate::CancellableReader

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use lumen_core::logging::{span_names, targets};
use lumen_core::{
    CallbackContext, CancellationToken, CompletionHandle, CompletionWaiter, Mailbox,
    QueuedInvocation, completion_pair,
};
use parking_lot::Mutex;

use crate::config::LoadTaskConfig;
use crate::decode::{DecodedImage, decode_source};
use crate::error::{LoadError, LoadResult};
use crate::handler::ImageLoadHandler;
use crate::source::ImageSource;

/// Identifies one submission to an [`ImageLoadTask`].
///
/// Tickets of one task increase with every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID of this ticket.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// The lifecycle state of an [`ImageLoadTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Nothing is pending or being decoded.
    Idle,
    /// A current load is pending or being decoded.
    Loading,
    /// Only cancelled loads remain, and the worker has not finished them yet.
    Cancelling,
    /// The task has been disposed.
    Disposed,
}

/// A submission travelling from the caller to the worker.
struct Submission {
    ticket: LoadTicket,
    source: ImageSource,
    token: CancellationToken,
    /// Signals the end of the round when dropped.
    _done: CompletionHandle,
}

/// Caller-side record of a submission that may not have finished yet.
struct Outstanding {
    ticket: LoadTicket,
    token: CancellationToken,
    done: CompletionWaiter,
}

struct Control {
    disposed: bool,
    worker: Option<JoinHandle<()>>,
    /// The latest submission, kept until superseded, cancelled or disposed
    /// even when its round has already ended.
    current: Option<(LoadTicket, CancellationToken)>,
    outstanding: Vec<Outstanding>,
}

impl Control {
    fn prune(&mut self) {
        self.outstanding.retain(|o| !o.done.is_done());
    }

    fn worker_thread(&self) -> Option<ThreadId> {
        self.worker.as_ref().map(|worker| worker.thread().id())
    }
}

/// State shared with the worker thread.
struct Shared {
    mailbox: Mailbox<Submission>,
    handler: Mutex<Box<dyn ImageLoadHandler>>,
    context: Box<dyn CallbackContext>,
    config: LoadTaskConfig,
    /// Held while a delivery checks its token and runs the handler.
    delivery: Mutex<()>,
}

/// Loads images on a dedicated background thread, newest request wins.
///
/// # Thread Safety
///
/// `ImageLoadTask` is `Send + Sync`; any thread may submit or cancel.
/// Handler calls always happen on the callback context.
pub struct ImageLoadTask {
    shared: Arc<Shared>,
    control: Mutex<Control>,
    next_ticket: AtomicU64,
}

impl ImageLoadTask {
    /// Create a task with the default configuration.
    ///
    /// The worker thread is not started until the first submission.
    pub fn new<C, H>(context: C, handler: H) -> Self
    where
        C: CallbackContext + 'static,
        H: ImageLoadHandler,
    {
        Self::with_config(LoadTaskConfig::default(), context, handler)
    }

    /// Create a task with a custom configuration.
    pub fn with_config<C, H>(config: LoadTaskConfig, context: C, handler: H) -> Self
    where
        C: CallbackContext + 'static,
        H: ImageLoadHandler,
    {
        Self {
            shared: Arc::new(Shared {
                mailbox: Mailbox::new(),
                handler: Mutex::new(Box::new(handler)),
                context: Box::new(context),
                config,
                delivery: Mutex::new(()),
            }),
            control: Mutex::new(Control {
                disposed: false,
                worker: None,
                current: None,
                outstanding: Vec::new(),
            }),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Start building a task with custom settings.
    pub fn builder() -> LoadTaskBuilder {
        LoadTaskBuilder::new()
    }

    /// Make `source` the image to load, superseding any earlier submission.
    ///
    /// Earlier loads are flagged cancelled; this call does not wait for them
    /// to stop. Their results are never delivered after this returns, even
    /// when they already finished and sit queued on the callback context.
    /// Called off the context thread, it waits for a handler call that is
    /// already running there.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Disposed`] after [`dispose`](Self::dispose), and
    /// [`LoadError::WorkerSpawn`] if the worker thread cannot be started.
    pub fn submit(&self, source: ImageSource) -> LoadResult<LoadTicket> {
        let ticket = {
            let mut control = self.control.lock();
            if control.disposed {
                return Err(LoadError::Disposed);
            }
            self.ensure_worker(&mut control)?;
            control.prune();

            let ticket = LoadTicket::new(self.next_ticket.fetch_add(1, Ordering::Relaxed));
            let token = CancellationToken::new();
            let superseded = match control.current.replace((ticket, token.clone())) {
                Some((previous, previous_token)) if previous_token.cancel() => {
                    tracing::debug!(
                        target: targets::IMAGE,
                        ticket = previous.id(),
                        "superseded image load"
                    );
                    true
                }
                _ => false,
            };

            let (handle, waiter) = completion_pair();
            control.outstanding.push(Outstanding {
                ticket,
                token: token.clone(),
                done: waiter,
            });

            tracing::debug!(
                target: targets::IMAGE,
                ticket = ticket.id(),
                source = source.label(),
                superseded,
                "submitted image load"
            );

            let submission = Submission {
                ticket,
                source,
                token,
                _done: handle,
            };
            if let Some(replaced) = self.shared.mailbox.put(submission) {
                tracing::trace!(
                    target: targets::IMAGE,
                    ticket = replaced.ticket.id(),
                    "replaced pending submission before pickup"
                );
            }
            ticket
        };

        self.settle_delivery();
        Ok(ticket)
    }

    /// Cancel the pending and in-progress loads and wait for the worker to
    /// let go of them.
    ///
    /// Returns immediately when nothing is outstanding.
    pub fn cancel_current(&self) {
        let (waiters, on_worker) = {
            let mut control = self.control.lock();
            let on_worker = control.worker_thread() == Some(thread::current().id());
            (self.cancel_outstanding(&mut control), on_worker)
        };
        self.settle_delivery();
        if waiters.is_empty() || on_worker {
            return;
        }
        for waiter in &waiters {
            waiter.wait();
        }
        tracing::debug!(target: targets::IMAGE, count = waiters.len(), "cancelled image loads");
    }

    /// Cancel everything, refuse further submissions and stop the worker.
    ///
    /// Blocks until the worker thread has exited. Calling it again has no
    /// effect. Dropping the task disposes it.
    ///
    /// When called on the worker thread itself, from inside a source read,
    /// it cannot wait for its own round; the worker then exits as soon as
    /// that round returns.
    pub fn dispose(&self) {
        let (waiters, worker) = {
            let mut control = self.control.lock();
            if control.disposed {
                return;
            }
            control.disposed = true;
            let waiters = self.cancel_outstanding(&mut control);
            self.shared.mailbox.close();
            (waiters, control.worker.take())
        };
        self.settle_delivery();

        match worker {
            Some(worker) if worker.thread().id() == thread::current().id() => {
                tracing::debug!(target: targets::IMAGE, "image load task disposed from its worker");
                return;
            }
            Some(worker) => {
                for waiter in &waiters {
                    waiter.wait();
                }
                if worker.join().is_err() {
                    tracing::error!(target: targets::IMAGE, "image load worker panicked");
                }
            }
            None => {}
        }
        tracing::debug!(target: targets::IMAGE, "image load task disposed");
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> TaskState {
        let mut control = self.control.lock();
        if control.disposed {
            return TaskState::Disposed;
        }
        control.prune();
        if control.outstanding.is_empty() {
            TaskState::Idle
        } else if control.outstanding.iter().any(|o| !o.token.is_cancelled()) {
            TaskState::Loading
        } else {
            TaskState::Cancelling
        }
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.control.lock().disposed
    }

    /// Get the ticket of the most recent submission, if any.
    pub fn last_ticket(&self) -> Option<LoadTicket> {
        match self.next_ticket.load(Ordering::Relaxed) {
            1 => None,
            next => Some(LoadTicket::new(next - 1)),
        }
    }

    /// Get the configuration this task was created with.
    pub fn config(&self) -> &LoadTaskConfig {
        &self.shared.config
    }

    /// Wait for a delivery running on the callback context to finish.
    ///
    /// Tokens are cancelled before this is called, so any delivery that
    /// starts afterwards sees the cancellation. On the context thread itself
    /// no other delivery can be running.
    fn settle_delivery(&self) {
        if !self.shared.context.is_context_thread() {
            drop(self.shared.delivery.lock());
        }
    }

    fn ensure_worker(&self, control: &mut Control) -> LoadResult<()> {
        if control.worker.is_some() {
            return Ok(());
        }

        let config = &self.shared.config;
        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let shared = self.shared.clone();
        let handle = builder
            .spawn(move || worker_loop(shared))
            .map_err(LoadError::WorkerSpawn)?;
        control.worker = Some(handle);
        Ok(())
    }

    /// Flag the current load and every outstanding one cancelled, and drop a
    /// pending submission.
    ///
    /// Returns the waiters of the rounds that have not finished yet.
    fn cancel_outstanding(&self, control: &mut Control) -> Vec<CompletionWaiter> {
        if let Some((_, token)) = control.current.take() {
            token.cancel();
        }
        drop(self.shared.mailbox.try_take());
        control.prune();
        control
            .outstanding
            .iter()
            .map(|outstanding| {
                outstanding.token.cancel();
                outstanding.done.clone()
            })
            .collect()
    }
}

impl Drop for ImageLoadTask {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ImageLoadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoadTask")
            .field("state", &self.state())
            .field("last_ticket", &self.last_ticket())
            .field("config", &self.shared.config)
            .finish()
    }
}

/// The worker thread body: one round per submission until the mailbox closes.
fn worker_loop(shared: Arc<Shared>) {
    tracing::debug!(target: targets::IMAGE, "image load worker started");
    while let Some(submission) = shared.mailbox.take() {
        run_round(&shared, submission);
    }
    tracing::debug!(target: targets::IMAGE, "image load worker exiting");
}

fn run_round(shared: &Arc<Shared>, submission: Submission) {
    let Submission {
        ticket,
        source,
        token,
        _done,
    } = submission;
    let _span =
        tracing::debug_span!(target: targets::IMAGE, span_names::IMAGE_LOAD, ticket = ticket.id())
            .entered();

    if token.is_cancelled() {
        tracing::trace!(target: targets::IMAGE, "skipping load cancelled before pickup");
        return;
    }

    let label = source.label().to_owned();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        decode_source(source, &token, &shared.config)
    }))
    .unwrap_or_else(|payload| {
        Err(LoadError::Decode(format!(
            "decoder panicked: {}",
            panic_message(payload.as_ref())
        )))
    });

    if token.is_cancelled() {
        tracing::debug!(target: targets::IMAGE, source = %label, "discarding cancelled load");
        return;
    }

    if let Err(error) = &outcome {
        tracing::debug!(target: targets::IMAGE, source = %label, %error, "image load failed");
    }
    deliver(shared, ticket, token, outcome);
    // `_done` drops here, after the result is queued.
}

/// Post the outcome of a round to the callback context.
fn deliver(
    shared: &Arc<Shared>,
    ticket: LoadTicket,
    token: CancellationToken,
    outcome: LoadResult<DecodedImage>,
) {
    let delivering = shared.clone();
    let invocation = QueuedInvocation::new(move || {
        let _delivery = delivering.delivery.lock();
        if token.is_cancelled() {
            tracing::trace!(
                target: targets::IMAGE,
                ticket = ticket.id(),
                "dropping result superseded before delivery"
            );
            return;
        }
        let mut handler = delivering.handler.lock();
        match outcome {
            Ok(image) => handler.on_image_loaded(ticket, image),
            Err(error) => handler.on_load_failed(ticket, error),
        }
    });

    if let Err(err) = shared.context.post(invocation) {
        tracing::warn!(
            target: targets::IMAGE,
            ticket = ticket.id(),
            %err,
            "could not deliver image load result"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Builder for creating an [`ImageLoadTask`] with custom configuration.
#[derive(Debug, Default)]
pub struct LoadTaskBuilder {
    config: LoadTaskConfig,
}

impl LoadTaskBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LoadTaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Set the stack size for the worker thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Set the buffer size between the source and the decoder.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Reject images larger than `width` x `height`.
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.config.max_width = Some(width);
        self.config.max_height = Some(height);
        self
    }

    /// Cap decoder allocations, or lift the cap with `None`.
    pub fn max_alloc(mut self, bytes: Option<u64>) -> Self {
        self.config.max_alloc = bytes;
        self
    }

    /// Build the task. The worker starts on the first submission.
    pub fn build<C, H>(self, context: C, handler: H) -> ImageLoadTask
    where
        C: CallbackContext + 'static,
        H: ImageLoadHandler,
    {
        ImageLoadTask::with_config(self.config, context, handler)
    }
}
