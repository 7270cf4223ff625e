use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Desync warnings after the first are only logged every this many occurrences.
const DESYNC_LOG_EVERY: u64 = 100;

/// Reassembles fixed-size frames from an unframed byte stream.
///
/// Bytes are appended to an internal buffer; every time the buffer holds a
/// whole frame, exactly `frame_size` bytes are split off and the rest stays
/// queued for the next frame. A single `feed` may therefore emit zero, one or
/// many frames, and the emitted sequence never depends on how the stream was
/// chunked.
///
/// An optional trailer (the camera producers write `"\n"` after each frame)
/// extends the on-wire unit to `frame_size + trailer.len()` bytes. The trailer
/// is consumed and compared but never forwarded; a mismatch means the stream
/// has drifted off the frame grid and is counted in [`desync_count`].
///
/// [`desync_count`]: FrameAccumulator::desync_count
#[derive(Debug)]
pub struct FrameAccumulator {
    frame_size: usize,
    trailer: Bytes,
    buf: BytesMut,
    frames_emitted: u64,
    desync_count: u64,
}

impl FrameAccumulator {
    /// Create an accumulator emitting frames of `frame_size` bytes.
    pub fn new(frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(FrameError::InvalidFrameSize);
        }
        Ok(Self {
            frame_size,
            trailer: Bytes::new(),
            buf: BytesMut::with_capacity(frame_size),
            frames_emitted: 0,
            desync_count: 0,
        })
    }

    /// Expect `trailer` after every frame.
    pub fn with_trailer(mut self, trailer: impl Into<Bytes>) -> Self {
        self.trailer = trailer.into();
        self
    }

    /// Append `chunk` and return every frame it completes, in stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::with_capacity(self.buf.len() / self.unit_size());
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Split one frame off the front of the buffer, if a whole unit is queued.
    fn next_frame(&mut self) -> Option<Frame> {
        if self.buf.len() < self.unit_size() {
            return None; // Need more data
        }

        let payload = self.buf.split_to(self.frame_size).freeze();
        if !self.trailer.is_empty() {
            if self.buf[..self.trailer.len()] != self.trailer[..] {
                self.record_desync();
            }
            self.buf.advance(self.trailer.len());
        }

        self.frames_emitted += 1;
        Some(Frame::binary(payload))
    }

    fn record_desync(&mut self) {
        self.desync_count += 1;
        if self.desync_count == 1 || self.desync_count % DESYNC_LOG_EVERY == 0 {
            warn!(
                frame_size = self.frame_size,
                desync_count = self.desync_count,
                frames_emitted = self.frames_emitted,
                "frame trailer mismatch; producer stream is off the frame grid"
            );
        }
    }

    /// Bytes per emitted frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bytes consumed from the stream per frame (frame plus trailer).
    pub fn unit_size(&self) -> usize {
        self.frame_size + self.trailer.len()
    }

    /// Configured trailer (empty if none).
    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    /// Bytes carried over toward the next frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Frames emitted since creation.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Trailer mismatches observed since creation.
    pub fn desync_count(&self) -> u64 {
        self.desync_count
    }
}
