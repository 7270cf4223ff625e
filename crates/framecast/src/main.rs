mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "framecast",
    version,
    about = "Relay raw camera and serial streams to WebSocket clients"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from([
            "framecast",
            "serve",
            "--host",
            "127.0.0.1",
            "--serial",
            "/dev/ttyACM0",
            "--baud",
            "9600",
            "--no-stdin",
        ])
        .expect("serve args should parse");

        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.host, Some("127.0.0.1".parse().unwrap()));
                assert_eq!(args.serial.as_deref(), Some("/dev/ttyACM0"));
                assert_eq!(args.baud, Some(9600));
                assert!(args.no_stdin);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn serial_defaults_match_firmware() {
        let cli = Cli::try_parse_from(["framecast", "serial", "/dev/cu.usbmodem2815011"])
            .expect("serial args should parse");

        match cli.command {
            Command::Serial(args) => {
                assert_eq!(args.baud, 115_200);
                assert_eq!(args.port, 8083);
                assert!(!args.no_stdin);
            }
            other => panic!("expected serial, got {other:?}"),
        }
    }

    #[test]
    fn serial_requires_device() {
        let err = Cli::try_parse_from(["framecast", "serial"]).expect_err("device is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_invalid_host() {
        let err = Cli::try_parse_from(["framecast", "serve", "--host", "not-an-ip"])
            .expect_err("host must be an IP address");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["framecast", "channels", "--format", "json"])
            .expect("global format should parse after subcommand");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.command, Command::Channels(_)));
    }
}
