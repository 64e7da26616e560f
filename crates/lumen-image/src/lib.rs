//! Interruptible background image loading for Lumen.
//!
//! This crate decodes images on a dedicated worker thread and hands the
//! results to a single-threaded callback context, typically the UI thread:
//!
//! - **[`ImageLoadTask`]**: one "current image" slot; every submission
//!   supersedes the previous one, and superseded results are never delivered
//! - **[`ImageSource`]**: files, memory, seekable readers and forward-only streams
//! - **[`CancellableReader`]**: makes every read of a source a cancellation point
//! - **[`ImageLoadHandler`]**: receives decoded images and failures
//!
//! # Example
//!
//! ```no_run
//! use lumen_core::DispatchThread;
//! use lumen_image::{ImageLoadTask, ImageSource, handler_fn};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ui = DispatchThread::spawn("ui")?;
//! let task = ImageLoadTask::builder()
//!     .thread_name("preview-loader")
//!     .max_dimensions(8192, 8192)
//!     .build(
//!         ui.handle(),
//!         handler_fn(
//!             |_, image| println!("loaded {}x{}", image.width(), image.height()),
//!             |_, error| eprintln!("failed: {error}"),
//!         ),
//!     );
//!
//! task.submit(ImageSource::open("photo.png")?)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod decode;
mod error;
mod handler;
mod reader;
mod source;
mod task;

pub use config::LoadTaskConfig;
pub use decode::DecodedImage;
pub use error::{LoadError, LoadResult};
pub use handler::{FnHandler, ImageLoadHandler, handler_fn};
pub use reader::{CancellableReader, ReadProbe};
pub use source::ImageSource;
pub use task::{ImageLoadTask, LoadTaskBuilder, LoadTicket, TaskState};

// Re-export the format type callers need for format hints.
pub use image::ImageFormat;

static_assertions::assert_impl_all!(ImageLoadTask: Send, Sync);
static_assertions::assert_impl_all!(ImageSource: Send);
static_assertions::assert_impl_all!(DecodedImage: Send, Sync, Clone);
static_assertions::assert_impl_all!(LoadError: Send, Sync);
