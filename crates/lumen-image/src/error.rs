//! Error types for image loading.

use thiserror::Error;

/// Errors that can occur while loading an image.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The byte source failed while it was being read.
    #[error("failed to read image source: {0}")]
    SourceRead(#[source] std::io::Error),

    /// The data could not be decoded: malformed, truncated, unsupported, or
    /// over the configured limits.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The task has been disposed and accepts no more work.
    #[error("image load task has been disposed")]
    Disposed,

    /// The background worker thread could not be started.
    #[error("failed to spawn image load worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl LoadError {
    /// Returns `true` for failures of the byte source itself.
    pub fn is_source_read(&self) -> bool {
        matches!(self, Self::SourceRead(_))
    }

    /// Returns `true` for failures to decode the data.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Returns `true` when the operation was refused because of disposal.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

impl From<image::ImageError> for LoadError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for image loading operations.
pub type LoadResult<T> = Result<T, LoadError>;
