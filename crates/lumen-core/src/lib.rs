//! Core systems for Lumen.
//!
//! This crate provides the host plumbing that background work in Lumen is
//! built on:
//!
//! - **Callback contexts**: single-threaded queues that results are delivered
//!   on ([`DispatchQueue`], [`DispatchThread`])
//! - **Queued invocations**: type-erased closures with completion signalling
//! - **Mailbox**: a one-slot, newest-wins handoff between threads
//! - **Cancellation**: cooperative cancellation tokens
//! - **Thread checks**: thread affinity assertions
//! - **Logging**: `tracing` targets, span names and macros
//!
//! # Example
//!
//! ```
//! use lumen_core::{CancellationToken, DispatchThread, Mailbox};
//! use std::sync::Arc;
//!
//! let context = DispatchThread::spawn("ui").unwrap();
//! let mailbox = Arc::new(Mailbox::new());
//! let token = CancellationToken::new();
//!
//! let worker = {
//!     let mailbox = mailbox.clone();
//!     let token = token.clone();
//!     let ui = context.handle();
//!     std::thread::spawn(move || {
//!         while let Some(job) = mailbox.take() {
//!             if token.is_cancelled() {
//!                 continue;
//!             }
//!             let doubled = job * 2;
//!             ui.post_fn(move || println!("result: {doubled}")).unwrap();
//!         }
//!     })
//! };
//!
//! mailbox.put(21);
//! mailbox.close();
//! worker.join().unwrap();
//! context.flush().unwrap();
//! ```

pub mod logging;

mod cancel;
pub mod dispatch;
mod error;
pub mod invocation;
mod mailbox;
pub mod thread_check;

pub use cancel::CancellationToken;
pub use dispatch::{CallbackContext, DispatchHandle, DispatchQueue, DispatchThread};
pub use error::{CoreError, Result};
pub use invocation::{CompletionHandle, CompletionWaiter, QueuedInvocation, completion_pair};
pub use logging::PerfSpan;
pub use mailbox::Mailbox;
pub use thread_check::ThreadAffinity;

static_assertions::assert_impl_all!(DispatchHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(DispatchThread: Send, Sync);
static_assertions::assert_impl_all!(Mailbox<QueuedInvocation>: Send, Sync);
static_assertions::assert_impl_all!(CancellationToken: Send, Sync, Clone);
static_assertions::assert_impl_all!(CompletionWaiter: Send, Sync, Clone);
