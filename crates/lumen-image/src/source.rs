//! Byte sources for image loads.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::Path;

use image::ImageFormat;

/// Readers the decoder can rewind.
pub(crate) trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

pub(crate) enum SourceKind {
    /// A source the decoder reads directly.
    Seekable(Box<dyn ReadSeek>),
    /// A forward-only source that is buffered before decoding.
    Stream(Box<dyn Read + Send>),
}

/// A readable byte source to decode an image from.
///
/// Ownership of the source moves into the task on submit. The task drops it
/// as soon as the load finishes, is superseded or is cancelled.
///
/// # Example
///
/// ```no_run
/// use lumen_image::ImageSource;
/// use image::ImageFormat;
///
/// # fn example() -> std::io::Result<()> {
/// let from_file = ImageSource::open("photo.jpg")?;
/// let from_memory = ImageSource::from_bytes(vec![0u8; 16]).with_format(ImageFormat::Png);
/// let from_socket = ImageSource::from_stream(std::io::empty()).with_label("socket");
/// # Ok(())
/// # }
/// ```
pub struct ImageSource {
    pub(crate) kind: SourceKind,
    pub(crate) format: Option<ImageFormat>,
    pub(crate) label: String,
}

impl ImageSource {
    /// Create a source from a seekable reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self {
            kind: SourceKind::Seekable(Box::new(reader)),
            format: None,
            label: "reader".to_string(),
        }
    }

    /// Create a source from a forward-only reader, such as a socket or pipe.
    ///
    /// The worker reads it to the end, checking for cancellation on every
    /// read, before handing the bytes to the decoder.
    pub fn from_stream<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            kind: SourceKind::Stream(Box::new(reader)),
            format: None,
            label: "stream".to_string(),
        }
    }

    /// Create a source from bytes in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: SourceKind::Seekable(Box::new(Cursor::new(bytes.into()))),
            format: None,
            label: "memory".to_string(),
        }
    }

    /// Open a file as a source.
    ///
    /// The format is guessed from the file content, not its extension.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self {
            kind: SourceKind::Seekable(Box::new(file)),
            format: None,
            label: path.display().to_string(),
        })
    }

    /// Decode as the given format instead of guessing from the content.
    #[must_use]
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the label used for this source in logs.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Get the explicit format, if one was set.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// Get the label used for this source in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` if the source must be buffered before decoding.
    pub fn is_stream(&self) -> bool {
        matches!(self.kind, SourceKind::Stream(_))
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("label", &self.label)
            .field("format", &self.format)
            .field("stream", &self.is_stream())
            .finish()
    }
}
