//! Serial device access.

use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::error::{Result, TransportError};

/// Default baud rate used by the microcontroller firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read timeout; short so reader threads notice shutdown promptly.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Settings for opening a serial device.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Device path (e.g. `/dev/ttyACM0`, `/dev/cu.usbmodem2815011`).
    pub device: String,
    /// Baud rate. Framing is fixed at 8N1 without flow control.
    pub baud_rate: u32,
    /// Read timeout applied to the port.
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Open a serial device (8N1, no flow control).
pub fn open_serial(settings: &SerialSettings) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(settings.device.as_str(), settings.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(settings.read_timeout)
        .open()
        .map_err(|source| TransportError::SerialOpen {
            device: settings.device.clone(),
            source,
        })?;

    info!(
        device = %settings.device,
        baud_rate = settings.baud_rate,
        "serial port opened"
    );
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_short_timeout() {
        let settings = SerialSettings::new("/dev/ttyACM0", DEFAULT_BAUD_RATE);
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn missing_device_reports_path() {
        let settings = SerialSettings::new("/dev/framecast-does-not-exist", DEFAULT_BAUD_RATE);
        let err = match open_serial(&settings) {
            Ok(_) => panic!("device should not exist"),
            Err(err) => err,
        };
        match err {
            TransportError::SerialOpen { device, .. } => {
                assert_eq!(device, "/dev/framecast-does-not-exist");
            }
            other => panic!("expected serial open error, got {other:?}"),
        }
    }
}
