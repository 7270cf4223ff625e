//! Bridge configuration.
//!
//! Defaults reproduce the camera rig the bridge was built for: an RGB feed
//! (640×480×3) on producer port 3490 served on 8081, and a depth feed
//! (640×480) on 3491 served on 8082. Both producers write a `"\n"` after
//! every frame.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// RGB frame: 640×480 pixels, 3 bytes per pixel.
pub const RGB_FRAME_SIZE: usize = 640 * 480 * 3;
/// Depth frame: 640×480 pixels, 1 byte per pixel.
pub const DEPTH_FRAME_SIZE: usize = 640 * 480;

pub const RGB_SOURCE_PORT: u16 = 3490;
pub const DEPTH_SOURCE_PORT: u16 = 3491;
pub const RGB_SUBSCRIBE_PORT: u16 = 8081;
pub const DEPTH_SUBSCRIBE_PORT: u16 = 8082;
pub const SERIAL_SUBSCRIBE_PORT: u16 = 8083;

/// Name of the channel fed by the serial bridge.
pub const SERIAL_CHANNEL: &str = "serial";

const DEFAULT_QUEUE_DEPTH: usize = 4;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1_000;

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Address every listener binds to.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Producer channels.
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
    /// Subscriber delivery settings shared by all channels.
    #[serde(default)]
    pub subscriber: SubscriberConfig,
    /// Optional serial bridge.
    #[serde(default)]
    pub serial: Option<SerialConfig>,
}

/// How producer bytes are framed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Back-to-back raw frames of `frame_size` bytes.
    #[default]
    Raw,
    /// One base64 line per message (or per chunk, when `frame_size > 0`).
    Base64Lines,
}

/// One producer channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    /// TCP port producers connect to.
    pub source_port: u16,
    /// WebSocket port subscribers connect to.
    pub subscribe_port: u16,
    /// Bytes per frame; 0 in line mode means one frame per decoded line.
    pub frame_size: usize,
    #[serde(default)]
    pub encoding: Encoding,
    /// Bytes the producer writes after every raw frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer: Option<String>,
    /// Line delimiter for `base64_lines`.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

/// Subscriber delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriberConfig {
    /// Frames queued per subscriber before it counts as too slow and is dropped.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Upper bound on one WebSocket write (and the opening handshake).
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Serial bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_serial_port")]
    pub subscribe_port: u16,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Forward stdin keystrokes to the device.
    #[serde(default = "default_true")]
    pub forward_stdin: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            channels: default_channels(),
            subscriber: SubscriberConfig::default(),
            serial: None,
        }
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl SubscriberConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl ChannelConfig {
    /// A raw fixed-size channel without a trailer.
    pub fn raw(
        name: impl Into<String>,
        source_port: u16,
        subscribe_port: u16,
        frame_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            source_port,
            subscribe_port,
            frame_size,
            encoding: Encoding::Raw,
            trailer: None,
            delimiter: default_delimiter(),
        }
    }

    /// A base64 line channel.
    pub fn base64_lines(
        name: impl Into<String>,
        source_port: u16,
        subscribe_port: u16,
        frame_size: usize,
    ) -> Self {
        Self {
            encoding: Encoding::Base64Lines,
            ..Self::raw(name, source_port, subscribe_port, frame_size)
        }
    }

    pub fn with_trailer(mut self, trailer: impl Into<String>) -> Self {
        self.trailer = Some(trailer.into());
        self
    }
}

impl SerialConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud_rate: default_baud_rate(),
            subscribe_port: default_serial_port(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            forward_stdin: true,
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl BridgeConfig {
    /// A configuration running only the serial bridge.
    pub fn serial_only(serial: SerialConfig) -> Self {
        Self {
            channels: Vec::new(),
            serial: Some(serial),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Producer address for a channel.
    pub fn source_addr(&self, channel: &ChannelConfig) -> SocketAddr {
        SocketAddr::new(self.host, channel.source_port)
    }

    /// Subscriber address for a channel.
    pub fn subscribe_addr(&self, channel: &ChannelConfig) -> SocketAddr {
        SocketAddr::new(self.host, channel.subscribe_port)
    }

    /// Check everything that would otherwise fail once listeners are running.
    ///
    /// Port 0 (ephemeral) is exempt from the duplicate-port check.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() && self.serial.is_none() {
            return Err(BridgeError::Config(
                "no channels configured and no serial device".to_string(),
            ));
        }
        if self.subscriber.queue_depth == 0 {
            return Err(BridgeError::Config(
                "subscriber.queue_depth must be at least 1".to_string(),
            ));
        }
        if self.subscriber.write_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "subscriber.write_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        let mut claim_port = |port: u16, owner: &str| -> Result<()> {
            if port != 0 && !ports.insert(port) {
                return Err(BridgeError::Config(format!(
                    "port {port} ({owner}) is used more than once"
                )));
            }
            Ok(())
        };

        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(BridgeError::Config("channel name must not be empty".to_string()));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(BridgeError::DuplicateChannel(channel.name.clone()));
            }
            claim_port(channel.source_port, &channel.name)?;
            claim_port(channel.subscribe_port, &channel.name)?;

            match channel.encoding {
                Encoding::Raw if channel.frame_size == 0 => {
                    return Err(BridgeError::Config(format!(
                        "channel {}: raw channels need a frame_size of at least 1",
                        channel.name
                    )));
                }
                Encoding::Base64Lines if channel.delimiter.is_empty() => {
                    return Err(BridgeError::Config(format!(
                        "channel {}: delimiter must not be empty",
                        channel.name
                    )));
                }
                Encoding::Base64Lines if channel.trailer.is_some() => {
                    return Err(BridgeError::Config(format!(
                        "channel {}: trailer only applies to raw channels",
                        channel.name
                    )));
                }
                _ => {}
            }
        }

        if let Some(serial) = &self.serial {
            if serial.device.trim().is_empty() {
                return Err(BridgeError::Config("serial device must not be empty".to_string()));
            }
            if serial.baud_rate == 0 {
                return Err(BridgeError::Config(
                    "serial baud_rate must be greater than zero".to_string(),
                ));
            }
            if names.contains(SERIAL_CHANNEL) {
                return Err(BridgeError::DuplicateChannel(SERIAL_CHANNEL.to_string()));
            }
            claim_port(serial.subscribe_port, SERIAL_CHANNEL)?;
        }

        Ok(())
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig::raw("rgb", RGB_SOURCE_PORT, RGB_SUBSCRIBE_PORT, RGB_FRAME_SIZE)
            .with_trailer("\n"),
        ChannelConfig::raw("depth", DEPTH_SOURCE_PORT, DEPTH_SUBSCRIBE_PORT, DEPTH_FRAME_SIZE)
            .with_trailer("\n"),
    ]
}

fn default_delimiter() -> String {
    "\n".to_string()
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

fn default_baud_rate() -> u32 {
    framecast_transport::DEFAULT_BAUD_RATE
}

fn default_serial_port() -> u16 {
    SERIAL_SUBSCRIBE_PORT
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_camera_rig() {
        let config = BridgeConfig::default();
        config.validate().unwrap();

        let rgb = &config.channels[0];
        assert_eq!(rgb.name, "rgb");
        assert_eq!(rgb.frame_size, 921_600);
        assert_eq!(rgb.trailer.as_deref(), Some("\n"));
        assert_eq!(config.source_addr(rgb).port(), 3490);
        assert_eq!(config.subscribe_addr(rgb).port(), 8081);

        let depth = &config.channels[1];
        assert_eq!(depth.frame_size, 307_200);
        assert_eq!(config.subscribe_addr(depth).port(), 8082);
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = BridgeConfig::from_json(
            r#"{
                "host": "127.0.0.1",
                "channels": [
                    { "name": "imu", "source_port": 4000, "subscribe_port": 9000,
                      "frame_size": 0, "encoding": "base64_lines" }
                ],
                "serial": { "device": "/dev/ttyACM0" }
            }"#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.channels[0].encoding, Encoding::Base64Lines);
        assert_eq!(config.channels[0].delimiter, "\n");
        assert_eq!(config.subscriber, SubscriberConfig::default());

        let serial = config.serial.unwrap();
        assert_eq!(serial.baud_rate, 115_200);
        assert_eq!(serial.subscribe_port, 8083);
        assert!(serial.forward_stdin);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = BridgeConfig::from_json(r#"{ "hots": "127.0.0.1" }"#).unwrap_err();
        assert!(matches!(err, BridgeError::Json(_)));
    }

    #[test]
    fn rejects_zero_frame_size_on_raw_channel() {
        let config = BridgeConfig {
            channels: vec![ChannelConfig::raw("rgb", 1, 2, 0)],
            ..BridgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn rejects_duplicate_names_and_ports() {
        let config = BridgeConfig {
            channels: vec![ChannelConfig::raw("a", 1, 2, 4), ChannelConfig::raw("a", 3, 4, 4)],
            ..BridgeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BridgeError::DuplicateChannel(name)) if name == "a"
        ));

        let config = BridgeConfig {
            channels: vec![ChannelConfig::raw("a", 1, 2, 4), ChannelConfig::raw("b", 2, 5, 4)],
            ..BridgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn ephemeral_ports_may_repeat() {
        let config = BridgeConfig {
            channels: vec![ChannelConfig::raw("a", 0, 0, 4), ChannelConfig::raw("b", 0, 0, 4)],
            ..BridgeConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn serial_only_requires_device() {
        let config = BridgeConfig::serial_only(SerialConfig::new(""));
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

        let config = BridgeConfig::serial_only(SerialConfig::new("/dev/ttyUSB0"));
        config.validate().unwrap();
        assert!(config.channels.is_empty());
    }

    #[test]
    fn rejects_trailer_on_line_channel() {
        let config = BridgeConfig {
            channels: vec![ChannelConfig::base64_lines("imu", 1, 2, 0).with_trailer("\n")],
            ..BridgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }
}
