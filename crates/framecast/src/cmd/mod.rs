use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use framecast_hub::{Bridge, BridgeConfig, BridgeError};
use framecast_transport::DEFAULT_BAUD_RATE;
use tokio_util::sync::CancellationToken;

use crate::exit::{bridge_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

pub mod channels;
pub mod serial;
pub mod serve;
pub mod version;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every configured channel, plus the serial bridge if one is set.
    Serve(ServeArgs),
    /// Run only the serial bridge.
    Serial(SerialArgs),
    /// Print the effective channel table.
    Channels(ChannelsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Serial(args) => serial::run(args),
        Command::Channels(args) => channels::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// JSON configuration file. Built-in rgb/depth channels when omitted.
    #[arg(long, value_name = "FILE", env = "FRAMECAST_CONFIG")]
    pub config: Option<PathBuf>,
    /// Address every listener binds to.
    #[arg(long, value_name = "IP")]
    pub host: Option<IpAddr>,
    /// Serial device to bridge (overrides the config file's device).
    #[arg(long, value_name = "DEVICE")]
    pub serial: Option<String>,
    /// Serial baud rate.
    #[arg(long, value_name = "N")]
    pub baud: Option<u32>,
    /// Do not forward stdin keystrokes to the serial device.
    #[arg(long)]
    pub no_stdin: bool,
}

#[derive(Args, Debug)]
pub struct SerialArgs {
    /// Serial device path (e.g. /dev/ttyACM0).
    pub device: String,
    /// Baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// WebSocket port for subscribers.
    #[arg(long, default_value_t = framecast_hub::config::SERIAL_SUBSCRIBE_PORT)]
    pub port: u16,
    /// Address to bind.
    #[arg(long, value_name = "IP")]
    pub host: Option<IpAddr>,
    /// Do not forward stdin keystrokes to the device.
    #[arg(long)]
    pub no_stdin: bool,
}

#[derive(Args, Debug)]
pub struct ChannelsArgs {
    /// JSON configuration file. Built-in rgb/depth channels when omitted.
    #[arg(long, value_name = "FILE", env = "FRAMECAST_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Load the config file, or the built-in defaults when no path is given.
pub(crate) fn load_config(path: Option<&Path>) -> CliResult<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_file(path)
            .map_err(|err| bridge_error(&format!("config {} failed to load", path.display()), err)),
        None => Ok(BridgeConfig::default()),
    }
}

/// Run the bridge until Ctrl-C (or the serial interrupt key).
pub(crate) fn run_bridge(config: &BridgeConfig) -> CliResult<i32> {
    config
        .validate()
        .map_err(|err| bridge_error("invalid configuration", err))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("framecast-worker")
        .build()
        .map_err(|err| io_error("runtime startup failed", err))?;

    let shutdown = CancellationToken::new();
    install_ctrlc_handler(shutdown.clone())?;

    let result = runtime.block_on(async {
        let bridge = Bridge::start(config, shutdown.clone()).await?;
        bridge.wait().await;
        Ok::<(), BridgeError>(())
    });

    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result.map_err(|err| bridge_error("bridge failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(shutdown: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
