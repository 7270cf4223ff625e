use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::error::{FrameError, Result};

/// Default line delimiter.
pub const DEFAULT_DELIMITER: &[u8] = b"\n";

/// Default maximum encoded line length: 16 MiB.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Splits delimiter-terminated base64 text into decoded byte sequences.
///
/// Partial lines (including a delimiter split across reads) are held until the
/// delimiter arrives. Malformed lines are logged and skipped; lines that decode
/// to nothing are filtered out. A trailing `\r` before the delimiter is ignored.
///
/// Usable directly through [`feed`](LineDecoder::feed) or as a
/// `tokio_util` [`Decoder`] with `FramedRead`.
#[derive(Debug)]
pub struct LineDecoder {
    delimiter: Bytes,
    max_line: usize,
    pending: BytesMut,
    /// Offset already scanned for a delimiter in the current buffer.
    next_index: usize,
    /// Dropping an oversized line until its delimiter shows up.
    discarding: bool,
    lines_decoded: u64,
    lines_dropped: u64,
}

impl LineDecoder {
    /// Create a decoder splitting on `"\n"`.
    pub fn new() -> Self {
        Self {
            delimiter: Bytes::from_static(DEFAULT_DELIMITER),
            max_line: DEFAULT_MAX_LINE,
            pending: BytesMut::new(),
            next_index: 0,
            discarding: false,
            lines_decoded: 0,
            lines_dropped: 0,
        }
    }

    /// Create a decoder with an explicit delimiter and maximum line length.
    pub fn with_delimiter(delimiter: impl Into<Bytes>, max_line: usize) -> Result<Self> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(FrameError::EmptyDelimiter);
        }
        Ok(Self {
            delimiter,
            max_line,
            ..Self::new()
        })
    }

    /// Append `chunk` and return every decoded line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        if chunk.is_empty() {
            return Vec::new();
        }
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        // `decode` never fails; bad lines are logged and skipped internally.
        while let Ok(Some(line)) = self.decode(&mut pending) {
            lines.push(line);
        }
        self.pending = pending;
        lines
    }

    /// Lines successfully decoded so far.
    pub fn lines_decoded(&self) -> u64 {
        self.lines_decoded
    }

    /// Lines dropped as malformed or oversized.
    pub fn lines_dropped(&self) -> u64 {
        self.lines_dropped
    }

    /// Bytes of an incomplete line held by [`feed`](LineDecoder::feed).
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn find_delimiter(&self, src: &[u8]) -> Option<usize> {
        let width = self.delimiter.len();
        if src.len() < width {
            return None;
        }
        (self.next_index..=src.len() - width).find(|&i| src[i..i + width] == self.delimiter[..])
    }

    fn decode_line(&mut self, mut line: &[u8]) -> Option<Bytes> {
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        if line.is_empty() {
            return None;
        }

        match BASE64.decode(line) {
            Ok(decoded) if decoded.is_empty() => None,
            Ok(decoded) => {
                self.lines_decoded += 1;
                Some(Bytes::from(decoded))
            }
            Err(source) => {
                self.lines_dropped += 1;
                let err = FrameError::Base64 {
                    len: line.len(),
                    source,
                };
                warn!(error = %err, "dropping line");
                None
            }
        }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineDecoder {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let width = self.delimiter.len();
        loop {
            let Some(pos) = self.find_delimiter(src) else {
                // Rescan only the tail that could still start a split delimiter.
                self.next_index = src.len().saturating_sub(width - 1);
                if src.len() > self.max_line {
                    if !self.discarding {
                        self.lines_dropped += 1;
                        let err = FrameError::LineTooLong {
                            size: src.len(),
                            max: self.max_line,
                        };
                        warn!(error = %err, "discarding until next delimiter");
                    }
                    self.discarding = true;
                    src.advance(self.next_index);
                    self.next_index = 0;
                }
                return Ok(None);
            };

            let line = src.split_to(pos).freeze();
            src.advance(width);
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if let Some(decoded) = self.decode_line(&line) {
                return Ok(Some(decoded));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            debug!(size = src.len(), "discarding unterminated line at end of stream");
            src.clear();
        }
        self.next_index = 0;
        self.discarding = false;
        Ok(None)
    }
}
