//! Serial device bridge.
//!
//! Lines read from the device are published on the `serial` channel as JSON
//! string text frames. Keystrokes from the controlling terminal are written to
//! the device byte-for-byte until the interrupt key (Ctrl-C, `0x03`) is seen,
//! which cancels the whole bridge.
//!
//! Both directions run on dedicated OS threads: serial ports and stdin are
//! blocking handles.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use framecast_frame::Frame;
use framecast_transport::{open_serial, RawTerminal, SerialSettings};
use serialport::SerialPort;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcaster::ChannelBroadcaster;
use crate::config::SerialConfig;
use crate::error::{BridgeError, Result};

/// Keystroke that stops the bridge instead of being forwarded.
pub const INTERRUPT_KEY: u8 = 0x03;

type WriterSlot = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// How keystroke forwarding ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardExit {
    /// The interrupt key was pressed.
    Interrupted,
    /// Input reached end of file.
    Eof,
}

/// Turn one device line into a text frame holding a JSON string.
///
/// Trailing `\r`/`\n` are stripped and invalid UTF-8 is replaced. Returns
/// `None` for empty lines.
pub fn wrap_line(line: &[u8]) -> Option<Frame> {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    if end == 0 {
        return None;
    }
    let text = String::from_utf8_lossy(&line[..end]);
    Some(Frame::text(serde_json::Value::String(text.into_owned()).to_string()))
}

/// Copy keystrokes from `input` into `sink` until EOF or the interrupt key.
///
/// Bytes that arrive in the same read as the interrupt key but before it are
/// still forwarded.
pub fn forward_keystrokes<R, F>(mut input: R, mut sink: F) -> io::Result<KeyboardExit>
where
    R: Read,
    F: FnMut(&[u8]),
{
    let mut buf = [0u8; 256];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => return Ok(KeyboardExit::Eof),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = &buf[..n];
        if let Some(pos) = chunk.iter().position(|&b| b == INTERRUPT_KEY) {
            if pos > 0 {
                sink(&chunk[..pos]);
            }
            return Ok(KeyboardExit::Interrupted);
        }
        sink(chunk);
    }
}

/// Running serial bridge.
///
/// Dropping it restores the terminal mode and stops the reader thread; use
/// [`SerialBridge::join`] to wait for the reader after shutdown.
pub struct SerialBridge {
    device: String,
    reader: ReaderThread,
    terminal: Option<RawTerminal>,
}

impl SerialBridge {
    /// Open the device and start both directions.
    ///
    /// Failing to open the device here is fatal; later disconnects are retried.
    /// On any error nothing keeps running and the terminal mode is restored.
    pub fn start(
        config: &SerialConfig,
        broadcaster: ChannelBroadcaster,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let terminal = if config.forward_stdin {
            Some(RawTerminal::enable()?)
        } else {
            None
        };

        let settings = SerialSettings::new(config.device.as_str(), config.baud_rate);
        let port = open_serial(&settings)?;
        let writer: WriterSlot = Arc::new(Mutex::new(clone_writer(&settings, &*port)));

        let stop = shutdown.child_token();
        let reopen = {
            let settings = settings.clone();
            let writer = Arc::clone(&writer);
            let stop = stop.clone();
            let retry = config.reconnect_interval();
            move || {
                lock_writer(&writer).take();
                let port = reconnect(&settings, retry, &stop)?;
                *lock_writer(&writer) = clone_writer(&settings, &*port);
                Some(port)
            }
        };
        let reader = ReaderThread::spawn(port, reopen, broadcaster, stop, settings.device)?;

        if config.forward_stdin {
            // An error here drops `reader`, which stops it.
            thread::Builder::new()
                .name("serial-keyboard".to_string())
                .spawn(move || read_keyboard(writer, shutdown))
                .map_err(|source| BridgeError::Spawn {
                    name: "serial-keyboard",
                    source,
                })?;
        }

        Ok(Self {
            device: config.device.clone(),
            reader,
            terminal,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// True while the terminal is in raw mode for keystroke forwarding.
    pub fn raw_terminal(&self) -> bool {
        self.terminal.as_ref().is_some_and(RawTerminal::is_active)
    }

    /// Block until the reader thread exits.
    pub fn join(&mut self) {
        if !self.reader.join() {
            warn!(device = %self.device, "serial reader thread panicked");
        }
    }
}

impl std::fmt::Debug for SerialBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialBridge")
            .field("device", &self.device)
            .field("raw_terminal", &self.raw_terminal())
            .finish()
    }
}

/// Device reader thread. Stops once its token is cancelled or it is dropped.
struct ReaderThread {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ReaderThread {
    fn spawn<R, F>(
        port: R,
        reopen: F,
        broadcaster: ChannelBroadcaster,
        stop: CancellationToken,
        device: String,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        F: FnMut() -> Option<R> + Send + 'static,
    {
        let handle = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("serial-reader".to_string())
                .spawn(move || {
                    let lines = pump_lines(port, reopen, &broadcaster, &stop, &device);
                    debug!(device = %device, lines, "serial reader stopped");
                })
                .map_err(|source| BridgeError::Spawn {
                    name: "serial-reader",
                    source,
                })?
        };
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Wait for the thread. Returns false if it panicked.
    fn join(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }
}

impl Drop for ReaderThread {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn lock_writer(writer: &WriterSlot) -> MutexGuard<'_, Option<Box<dyn SerialPort>>> {
    writer.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clone_writer(settings: &SerialSettings, port: &dyn SerialPort) -> Option<Box<dyn SerialPort>> {
    match port.try_clone() {
        Ok(writer) => Some(writer),
        Err(err) => {
            warn!(device = %settings.device, error = %err, "serial writer unavailable");
            None
        }
    }
}

/// Publish every complete line read from `port` until `shutdown` fires.
///
/// Read timeouts only mean the device was quiet; a partial line survives them.
/// End of file or any other error discards the partial line and asks `reopen`
/// for a fresh port, stopping when it has none. Returns the number of lines
/// published.
fn pump_lines<R, F>(
    mut port: R,
    mut reopen: F,
    broadcaster: &ChannelBroadcaster,
    shutdown: &CancellationToken,
    device: &str,
) -> u64
where
    R: Read,
    F: FnMut() -> Option<R>,
{
    let mut buf = [0u8; 1024];
    let mut partial = Vec::new();
    let mut lines = 0u64;

    while !shutdown.is_cancelled() {
        let failure = match port.read(&mut buf) {
            Ok(0) => "device closed".to_string(),
            Ok(n) => {
                let frames = split_lines(&mut partial, &buf[..n]);
                lines += frames.len() as u64;
                broadcaster.broadcast_batch(frames);
                continue;
            }
            Err(err) if is_quiet(&err) => continue,
            Err(err) => err.to_string(),
        };

        warn!(device = %device, error = %failure, "serial read failed; reconnecting");
        partial.clear();
        match reopen() {
            Some(next) => port = next,
            None => break,
        }
    }

    lines
}

/// Errors that only mean no byte arrived before the port's read timeout.
fn is_quiet(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Append `chunk` to `partial` and wrap every line it completes.
fn split_lines(partial: &mut Vec<u8>, chunk: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    for piece in chunk.split_inclusive(|&b| b == b'\n') {
        partial.extend_from_slice(piece);
        if piece.last() == Some(&b'\n') {
            frames.extend(wrap_line(partial));
            partial.clear();
        }
    }
    frames
}

/// Retry opening the device until it succeeds or `shutdown` fires.
fn reconnect(
    settings: &SerialSettings,
    retry: std::time::Duration,
    shutdown: &CancellationToken,
) -> Option<Box<dyn SerialPort>> {
    let mut attempts = 0u32;
    while !shutdown.is_cancelled() {
        thread::sleep(retry);
        attempts += 1;
        match open_serial(settings) {
            Ok(port) => {
                info!(device = %settings.device, attempts, "serial device reconnected");
                return Some(port);
            }
            Err(err) => {
                debug!(
                    device = %settings.device,
                    attempts,
                    error = %err,
                    "serial reconnect failed"
                );
            }
        }
    }
    None
}

fn read_keyboard(writer: WriterSlot, shutdown: CancellationToken) {
    let stdin = io::stdin();
    let result = forward_keystrokes(stdin.lock(), |bytes| {
        let mut slot = lock_writer(&writer);
        match slot.as_mut() {
            Some(port) => {
                if let Err(err) = port.write_all(bytes).and_then(|()| port.flush()) {
                    debug!(error = %err, "keystroke write failed");
                }
            }
            None => debug!(len = bytes.len(), "serial device offline; keystrokes discarded"),
        }
    });

    match result {
        Ok(KeyboardExit::Interrupted) => {
            info!("interrupt key pressed; shutting down");
            shutdown.cancel();
        }
        Ok(KeyboardExit::Eof) => debug!("stdin closed; keystroke forwarding stopped"),
        Err(err) => warn!(error = %err, "stdin read failed; keystroke forwarding stopped"),
    }
}
