/// Errors that can occur while configuring or running the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Transport-level error (bind, accept, serial open).
    #[error("transport error: {0}")]
    Transport(#[from] framecast_transport::TransportError),

    /// Frame pipeline configuration error.
    #[error("frame error: {0}")]
    Frame(#[from] framecast_frame::FrameError),

    /// Invalid bridge configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Two channels share a name.
    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),

    /// Configuration file could not be read.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background worker could not be started.
    #[error("failed to start worker {name}: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
