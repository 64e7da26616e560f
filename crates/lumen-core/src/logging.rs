//! Logging facilities for Lumen.
//!
//! Lumen uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Each subsystem logs under its own target (see [`targets`]) so it can be
//! filtered with the usual `RUST_LOG`-style directives, for example
//! `lumen_image=debug,lumen_core::dispatch=trace`.

/// Span names used throughout Lumen for tracing.
pub mod span_names {
    /// Callback context processing span.
    pub const DISPATCH: &str = "lumen::dispatch";
    /// One worker round of an image load.
    pub const IMAGE_LOAD: &str = "lumen::image_load";
    /// The decode step of an image load.
    pub const IMAGE_DECODE: &str = "lumen::image_decode";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "lumen_core";
    /// Callback context target.
    pub const DISPATCH: &str = "lumen_core::dispatch";
    /// Image loading target.
    pub const IMAGE: &str = "lumen_image";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "lumen::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// Macros for common tracing patterns.
///
/// These are thin wrappers around the `tracing` crate macros with
/// consistent target naming.
#[macro_export]
macro_rules! lumen_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "lumen_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! lumen_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "lumen_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! lumen_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "lumen_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! lumen_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "lumen_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! lumen_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "lumen_core", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let _span = PerfSpan::new(span_names::IMAGE_DECODE);
        lumen_debug!(operation = "test", "inside perf span");
    }

    #[test]
    fn test_targets_are_prefixed() {
        assert!(targets::DISPATCH.starts_with(targets::CORE));
        assert!(span_names::IMAGE_LOAD.starts_with("lumen::"));
    }
}
