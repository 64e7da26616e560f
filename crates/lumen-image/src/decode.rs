//! Decoding image sources into RGBA pixel buffers.

use std::io::{BufRead, BufReader, Cursor, Read, Seek};

use image::{ImageFormat, ImageReader, Limits, RgbaImage};
use lumen_core::logging::{span_names, targets};
use lumen_core::{CancellationToken, PerfSpan};

use crate::config::LoadTaskConfig;
use crate::error::{LoadError, LoadResult};
use crate::reader::{CancellableReader, ReadProbe};
use crate::source::{ImageSource, SourceKind};

/// A successfully decoded image.
///
/// Pixels are always 8-bit RGBA, whatever the source format was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    image: RgbaImage,
    format: Option<ImageFormat>,
}

impl DecodedImage {
    /// Wrap an RGBA buffer and the format it was decoded from.
    pub fn new(image: RgbaImage, format: Option<ImageFormat>) -> Self {
        Self { image, format }
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Width and height in pixels.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// The format the image was decoded from, when known.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// Raw RGBA bytes, row by row (`width * height * 4` bytes).
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Borrow the pixel buffer.
    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Take ownership of the pixel buffer.
    pub fn into_rgba_image(self) -> RgbaImage {
        self.image
    }

    /// Take ownership of the raw RGBA bytes.
    pub fn into_pixels(self) -> Vec<u8> {
        self.image.into_raw()
    }
}

/// Decode `source`, giving up early once `token` is cancelled.
///
/// When the token is cancelled mid-way the returned value is meaningless
/// (usually a decode error caused by the truncated input) and callers are
/// expected to discard it.
pub(crate) fn decode_source(
    source: ImageSource,
    token: &CancellationToken,
    config: &LoadTaskConfig,
) -> LoadResult<DecodedImage> {
    let _span = PerfSpan::new(span_names::IMAGE_DECODE);
    let ImageSource {
        kind,
        format,
        label,
    } = source;
    let limits = config.limits();

    match kind {
        SourceKind::Seekable(inner) => {
            let buffered = BufReader::with_capacity(config.read_buffer_size.max(1), inner);
            let reader = CancellableReader::new(buffered, token.clone());
            decode_seekable(reader, format, limits, &label)
        }
        SourceKind::Stream(inner) => {
            let bytes = buffer_stream(inner, token, &label, config.max_alloc)?;
            if token.is_cancelled() {
                return Err(LoadError::Decode("load cancelled while buffering".to_string()));
            }
            let cursor = BufReader::with_capacity(
                config.read_buffer_size.max(1),
                Cursor::new(bytes),
            );
            let reader = CancellableReader::new(cursor, token.clone());
            decode_seekable(reader, format, limits, &label)
        }
    }
}

/// Read a forward-only source to the end through cancellation checks.
///
/// At most `max_bytes` are buffered; a longer stream is rejected as a
/// decode failure.
fn buffer_stream(
    inner: Box<dyn Read + Send>,
    token: &CancellationToken,
    label: &str,
    max_bytes: Option<u64>,
) -> LoadResult<Vec<u8>> {
    let limit = max_bytes.unwrap_or(u64::MAX);
    let mut reader = CancellableReader::new(inner, token.clone()).take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(LoadError::SourceRead)?;
    if bytes.len() as u64 > limit {
        return Err(LoadError::Decode(format!(
            "stream source exceeds the allocation limit of {limit} bytes"
        )));
    }
    tracing::trace!(target: targets::IMAGE, source = label, bytes = bytes.len(), "buffered stream source");
    Ok(bytes)
}

fn decode_seekable<R: BufRead + Seek>(
    reader: CancellableReader<R>,
    format: Option<ImageFormat>,
    limits: Limits,
    label: &str,
) -> LoadResult<DecodedImage> {
    let probe = reader.probe();

    let mut image_reader = match format {
        Some(format) => ImageReader::with_format(reader, format),
        None => ImageReader::new(reader)
            .with_guessed_format()
            .map_err(|err| source_failure(&probe, err))?,
    };
    image_reader.limits(limits);

    let detected = image_reader.format();
    if detected.is_none() {
        tracing::debug!(target: targets::IMAGE, source = label, "could not determine image format");
    }

    let decoded = image_reader
        .decode()
        .map_err(|err| classify_decode_failure(&probe, err))?;

    let image = decoded.into_rgba8();
    tracing::trace!(
        target: targets::IMAGE,
        source = label,
        width = image.width(),
        height = image.height(),
        bytes_read = probe.bytes_read(),
        "decoded image"
    );
    Ok(DecodedImage::new(image, detected))
}

/// A failure while sniffing the format can only come from the source.
fn source_failure(probe: &ReadProbe, err: std::io::Error) -> LoadError {
    LoadError::SourceRead(probe.take_fault().unwrap_or(err))
}

/// Blame the source if it reported an error, otherwise the data.
///
/// Decoders report truncated input as I/O errors too, so the error kind
/// alone cannot tell the two apart.
fn classify_decode_failure(probe: &ReadProbe, err: image::ImageError) -> LoadError {
    match probe.take_fault() {
        Some(fault) => LoadError::SourceRead(fault),
        None => LoadError::from(err),
    }
}
