//! Stderr logging for the CLI. Stdout stays reserved for command output.

use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Extra filter directives, e.g. `FRAMECAST_LOG=framecast_hub::serial=trace`.
pub const LOG_ENV: &str = "FRAMECAST_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `--log-level` as the default, refined by [`LOG_ENV`]. Invalid directives
/// are skipped.
fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .with_env_var(LOG_ENV)
        .from_env_lossy()
}

/// Ends every line with `\r\n`.
///
/// The serial bridge puts the terminal in raw mode, where a bare `\n` no longer
/// returns the cursor to column 0.
struct CrlfWriter<W>(W);

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for piece in buf.split_inclusive(|&b| b == b'\n') {
            match piece.strip_suffix(b"\n") {
                Some(line) => {
                    self.0.write_all(line)?;
                    self.0.write_all(b"\r\n")?;
                }
                None => self.0.write_all(piece)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let writer = if io::stderr().is_terminal() {
        BoxMakeWriter::new(|| CrlfWriter(io::stderr().lock()))
    } else {
        BoxMakeWriter::new(io::stderr)
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(filter(level))
        .with_ansi(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crlf(input: &[u8]) -> Vec<u8> {
        let mut writer = CrlfWriter(Vec::new());
        writer.write_all(input).unwrap();
        writer.0
    }

    #[test]
    fn lines_end_with_carriage_return() {
        assert_eq!(crlf(b"serial device reconnected\n"), b"serial device reconnected\r\n");
        assert_eq!(crlf(b"a\nb\n"), b"a\r\nb\r\n");
    }

    #[test]
    fn partial_line_is_passed_through() {
        assert_eq!(crlf(b"no newline yet"), b"no newline yet");
    }

    #[test]
    fn level_maps_to_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }
}
