//! A reader that stops early once its load has been cancelled.
//!
//! Decoders pull their input through many small reads. Wrapping the source
//! in a [`CancellableReader`] makes every one of those reads a cancellation
//! point: once the token is cancelled, the reader reports end-of-data and
//! the decoder winds down on its own instead of running to completion.
//!
//! The reader also remembers whether the underlying source failed, so a
//! broken source can be told apart from broken image data after the fact.

use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use lumen_core::CancellationToken;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ProbeState {
    fault: Mutex<Option<io::Error>>,
    bytes_read: AtomicU64,
    interrupted: AtomicBool,
}

/// Observes a [`CancellableReader`] after it has been handed to a decoder.
#[derive(Debug, Clone, Default)]
pub struct ReadProbe {
    state: Arc<ProbeState>,
}

impl ReadProbe {
    /// Take the first error reported by the underlying source, if any.
    pub fn take_fault(&self) -> Option<io::Error> {
        self.state.fault.lock().take()
    }

    /// Returns `true` if the source reported an error.
    pub fn has_fault(&self) -> bool {
        self.state.fault.lock().is_some()
    }

    /// Total bytes delivered to the consumer.
    pub fn bytes_read(&self) -> u64 {
        self.state.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns `true` if a read was cut short by cancellation.
    pub fn was_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::Relaxed)
    }

    fn record(&self, n: usize) {
        self.state.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn record_fault(&self, err: &io::Error) {
        let mut fault = self.state.fault.lock();
        if fault.is_none() {
            *fault = Some(io::Error::new(err.kind(), err.to_string()));
        }
    }

    fn record_interrupt(&self) {
        self.state.interrupted.store(true, Ordering::Relaxed);
    }
}

/// A reader that reports end-of-data once its cancellation token is set.
#[derive(Debug)]
pub struct CancellableReader<R> {
    inner: R,
    token: CancellationToken,
    probe: ReadProbe,
}

impl<R> CancellableReader<R> {
    /// Wrap `inner`, checking `token` before every read.
    pub fn new(inner: R, token: CancellationToken) -> Self {
        Self {
            inner,
            token,
            probe: ReadProbe::default(),
        }
    }

    /// Get a probe that stays valid after the reader is moved into a decoder.
    pub fn probe(&self) -> ReadProbe {
        self.probe.clone()
    }

    fn observe<T>(&self, result: io::Result<T>) -> io::Result<T> {
        if let Err(err) = &result {
            if err.kind() != io::ErrorKind::Interrupted {
                self.probe.record_fault(err);
            }
        }
        result
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            self.probe.record_interrupt();
            return Ok(0);
        }
        let result = self.inner.read(buf);
        let n = self.observe(result)?;
        self.probe.record(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CancellableReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.token.is_cancelled() {
            self.probe.record_interrupt();
            return Ok(&[]);
        }
        match self.inner.fill_buf() {
            Ok(buf) => Ok(buf),
            Err(err) => {
                if err.kind() != io::ErrorKind::Interrupted {
                    self.probe.record_fault(&err);
                }
                Err(err)
            }
        }
    }

    fn consume(&mut self, amt: usize) {
        self.probe.record(amt);
        self.inner.consume(amt);
    }
}

impl<R: Seek> Seek for CancellableReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let result = self.inner.seek(pos);
        self.observe(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0xAB);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_reads_through_when_not_cancelled() {
        let token = CancellationToken::new();
        let mut reader = CancellableReader::new(Cursor::new(vec![7u8; 100]), token);
        let probe = reader.probe();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out.len(), 100);
        assert_eq!(probe.bytes_read(), 100);
        assert!(!probe.was_interrupted());
        assert!(!probe.has_fault());
    }

    #[test]
    fn test_reports_eof_after_cancel() {
        let token = CancellationToken::new();
        let mut reader = CancellableReader::new(Cursor::new(vec![1u8; 64]), token.clone());
        let probe = reader.probe();

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 16);

        token.cancel();
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(probe.was_interrupted());
        assert_eq!(probe.bytes_read(), 16);
    }

    #[test]
    fn test_buf_read_stops_after_cancel() {
        let token = CancellationToken::new();
        let inner = BufReader::with_capacity(8, Cursor::new(vec![9u8; 32]));
        let mut reader = CancellableReader::new(inner, token.clone());

        let first = reader.fill_buf().unwrap().len();
        assert_eq!(first, 8);
        reader.consume(first);

        token.cancel();
        assert!(reader.fill_buf().unwrap().is_empty());
        assert_eq!(reader.probe().bytes_read(), 8);
    }

    #[test]
    fn test_records_source_fault() {
        let token = CancellationToken::new();
        let mut reader = CancellableReader::new(FailingReader { remaining: 10 }, token);
        let probe = reader.probe();

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        let fault = probe.take_fault().unwrap();
        assert_eq!(fault.kind(), io::ErrorKind::ConnectionReset);
        assert!(probe.take_fault().is_none());
    }

    #[test]
    fn test_seek_delegates() {
        let token = CancellationToken::new();
        let mut reader = CancellableReader::new(Cursor::new(b"abcdef".to_vec()), token);

        reader.seek(SeekFrom::Start(3)).unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "def");
        assert_eq!(reader.probe().bytes_read(), 3);
    }
}
