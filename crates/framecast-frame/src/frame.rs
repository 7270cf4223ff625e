use bytes::Bytes;

/// How a frame is presented to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Opaque bytes (pixel buffers).
    Binary,
    /// UTF-8 text (serial telemetry).
    Text,
}

/// One complete unit ready for fan-out.
///
/// Cloning is cheap: the payload is reference counted, so every subscriber
/// shares the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Delivery kind.
    pub kind: FrameKind,
    /// Frame bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: Bytes::from(text.into()),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
