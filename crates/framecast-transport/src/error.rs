use std::net::SocketAddr;

/// Errors that can occur while opening or using an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the endpoint.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial device could not be opened.
    #[error("failed to open serial device {device}: {source}")]
    SerialOpen {
        device: String,
        source: serialport::Error,
    },

    /// The terminal could not be switched into (or out of) raw mode.
    #[error("terminal mode change failed: {0}")]
    Terminal(std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
