//! Configuration for image load tasks.

/// Default buffer size for reads from the image source.
const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Default allocation ceiling for a single decode (512 MiB).
const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

/// Configuration for an [`ImageLoadTask`](crate::ImageLoadTask).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTaskConfig {
    /// Name for the worker thread.
    pub thread_name: String,
    /// Stack size for the worker thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Capacity of the buffer between the source and the decoder.
    ///
    /// Cancellation is observed once per read, so smaller buffers make
    /// cancellation more prompt at the cost of more read calls.
    pub read_buffer_size: usize,
    /// Maximum accepted image width in pixels. `None` means unlimited.
    pub max_width: Option<u32>,
    /// Maximum accepted image height in pixels. `None` means unlimited.
    pub max_height: Option<u32>,
    /// Maximum number of bytes the decoder may allocate. `None` means unlimited.
    ///
    /// Forward-only stream sources are buffered in memory before decoding;
    /// a stream longer than this is rejected.
    pub max_alloc: Option<u64>,
}

impl Default for LoadTaskConfig {
    fn default() -> Self {
        Self {
            thread_name: "lumen-image-loader".to_string(),
            stack_size: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_width: None,
            max_height: None,
            max_alloc: Some(DEFAULT_MAX_ALLOC),
        }
    }
}

impl LoadTaskConfig {
    /// Create a new configuration with the given worker thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            thread_name: name.into(),
            ..Default::default()
        }
    }

    /// Build the decoder limits described by this configuration.
    pub(crate) fn limits(&self) -> image::Limits {
        let mut limits = image::Limits::no_limits();
        limits.max_image_width = self.max_width;
        limits.max_image_height = self.max_height;
        limits.max_alloc = self.max_alloc;
        limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LoadTaskConfig::default();
        assert_eq!(config.thread_name, "lumen-image-loader");
        assert!(config.stack_size.is_none());
        assert_eq!(config.read_buffer_size, 8 * 1024);
        assert_eq!(config.max_alloc, Some(512 * 1024 * 1024));
    }

    #[test]
    fn test_with_name() {
        let config = LoadTaskConfig::with_name("thumbnail-loader");
        assert_eq!(config.thread_name, "thumbnail-loader");
        assert_eq!(config.read_buffer_size, LoadTaskConfig::default().read_buffer_size);
    }

    #[test]
    fn test_limits() {
        let config = LoadTaskConfig {
            max_width: Some(640),
            max_height: Some(480),
            max_alloc: None,
            ..Default::default()
        };
        let limits = config.limits();
        assert_eq!(limits.max_image_width, Some(640));
        assert_eq!(limits.max_image_height, Some(480));
        assert_eq!(limits.max_alloc, None);
    }
}
