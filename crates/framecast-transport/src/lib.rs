//! Endpoints framecast talks to.
//!
//! Provides the three kinds of byte endpoint the bridge owns:
//! - TCP listeners (producer ports and WebSocket ports)
//! - Serial devices (the microcontroller link)
//! - The controlling terminal (raw keystroke input)
//!
//! This is the lowest layer of framecast. Framing and fan-out build on top of
//! the handles returned here.

pub mod error;
pub mod serial;
pub mod tcp;
pub mod tty;

pub use error::{Result, TransportError};
pub use serial::{open_serial, SerialSettings, DEFAULT_BAUD_RATE};
pub use tcp::bind_tcp;
pub use tty::RawTerminal;
