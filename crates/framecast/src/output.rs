use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framecast_hub::{BridgeConfig, Encoding, SERIAL_CHANNEL};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelRow {
    pub name: String,
    pub source: String,
    pub subscribe: String,
    pub frame_size: usize,
    pub encoding: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer: Option<String>,
}

/// Flatten the effective configuration into one row per channel.
pub fn channel_rows(config: &BridgeConfig) -> Vec<ChannelRow> {
    let mut rows: Vec<ChannelRow> = config
        .channels
        .iter()
        .map(|channel| ChannelRow {
            name: channel.name.clone(),
            source: config.source_addr(channel).to_string(),
            subscribe: config.subscribe_addr(channel).to_string(),
            frame_size: channel.frame_size,
            encoding: encoding_name(channel.encoding),
            trailer: channel.trailer.clone(),
        })
        .collect();

    if let Some(serial) = &config.serial {
        rows.push(ChannelRow {
            name: SERIAL_CHANNEL.to_string(),
            source: format!("{}@{}", serial.device, serial.baud_rate),
            subscribe: std::net::SocketAddr::new(config.host, serial.subscribe_port).to_string(),
            frame_size: 0,
            encoding: "serial_lines",
            trailer: None,
        });
    }

    rows
}

pub fn print_channels(config: &BridgeConfig, format: OutputFormat) {
    let rows = channel_rows(config);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "CHANNEL",
                    "SOURCE",
                    "SUBSCRIBE",
                    "FRAME SIZE",
                    "ENCODING",
                    "TRAILER",
                ]);
            for row in &rows {
                table.add_row(vec![
                    row.name.clone(),
                    row.source.clone(),
                    row.subscribe.clone(),
                    frame_size_label(row.frame_size),
                    row.encoding.to_string(),
                    row.trailer.as_deref().map(escape).unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                print!(
                    "{} source={} subscribe={} frame_size={} encoding={}",
                    row.name,
                    row.source,
                    row.subscribe,
                    frame_size_label(row.frame_size),
                    row.encoding
                );
                match &row.trailer {
                    Some(trailer) => println!(" trailer=\"{}\"", escape(trailer)),
                    None => println!(),
                }
            }
        }
    }
}

fn encoding_name(encoding: Encoding) -> &'static str {
    match encoding {
        Encoding::Raw => "raw",
        Encoding::Base64Lines => "base64_lines",
    }
}

fn frame_size_label(size: usize) -> String {
    match size {
        0 => "per line".to_string(),
        size => size.to_string(),
    }
}

fn escape(text: &str) -> String {
    text.escape_debug().to_string()
}

#[cfg(test)]
mod tests {
    use framecast_hub::{ChannelConfig, SerialConfig};

    use super::*;

    #[test]
    fn default_rows_describe_camera_channels() {
        let rows = channel_rows(&BridgeConfig::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "rgb");
        assert_eq!(rows[0].source, "0.0.0.0:3490");
        assert_eq!(rows[0].subscribe, "0.0.0.0:8081");
        assert_eq!(rows[0].frame_size, 921_600);
        assert_eq!(rows[0].trailer.as_deref(), Some("\n"));
        assert_eq!(rows[1].name, "depth");
    }

    #[test]
    fn serial_row_is_appended() {
        let mut config = BridgeConfig {
            channels: vec![ChannelConfig::base64_lines("imu", 4000, 9000, 0)],
            ..BridgeConfig::default()
        };
        config.serial = Some(SerialConfig::new("/dev/ttyACM0"));

        let rows = channel_rows(&config);
        assert_eq!(rows[0].encoding, "base64_lines");
        assert_eq!(rows[1].name, "serial");
        assert_eq!(rows[1].source, "/dev/ttyACM0@115200");
        assert_eq!(rows[1].subscribe, "0.0.0.0:8083");
    }

    #[test]
    fn trailer_is_escaped_for_display() {
        assert_eq!(escape("\r\n"), "\\r\\n");
        assert_eq!(frame_size_label(0), "per line");
    }
}
