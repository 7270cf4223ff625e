//! Channel fan-out from raw producers to WebSocket subscribers.
//!
//! This is the layer that runs the relay. Each channel pairs a producer port
//! with a WebSocket port: bytes arriving on the first are framed and every
//! complete frame is pushed to all subscribers of the second. An optional
//! serial bridge publishes device lines on its own channel and forwards
//! terminal keystrokes back to the device.

pub mod bridge;
pub mod broadcaster;
pub mod channel;
pub mod config;
pub mod error;
pub mod serial;
pub mod source;
pub mod subscription;

pub use bridge::{Bridge, ChannelEndpoints, RunningBridge, SerialEndpoint};
pub use broadcaster::{BroadcastReport, ChannelBroadcaster, SubscriberId, Subscription};
pub use channel::{Channel, ChannelStats};
pub use config::{
    BridgeConfig, ChannelConfig, Encoding, SerialConfig, SubscriberConfig, DEPTH_FRAME_SIZE,
    RGB_FRAME_SIZE, SERIAL_CHANNEL,
};
pub use error::{BridgeError, Result};
pub use serial::{forward_keystrokes, wrap_line, KeyboardExit, SerialBridge, INTERRUPT_KEY};
pub use source::SourceListener;
pub use subscription::SubscriptionServer;
