//! Relay raw camera and serial streams to browser WebSocket clients.
//!
//! Producers push unframed pixel buffers (or base64 lines) over TCP; framecast
//! rebuilds whole frames and fans each one out to every WebSocket subscriber
//! of that channel. A serial device can be bridged the same way.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listeners, serial devices, raw terminal mode
//! - [`frame`]: fixed-size accumulation and base64 line decoding
//! - [`hub`]: channels, subscriber fan-out and the running bridge (behind `hub` feature)

/// Re-export transport types.
pub mod transport {
    pub use framecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framecast_frame::*;
}

/// Re-export hub types (requires `hub` feature).
#[cfg(feature = "hub")]
pub mod hub {
    pub use framecast_hub::*;
}
