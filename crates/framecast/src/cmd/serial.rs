use framecast_hub::{BridgeConfig, SerialConfig};

use crate::cmd::{run_bridge, SerialArgs};
use crate::exit::CliResult;

pub fn run(args: SerialArgs) -> CliResult<i32> {
    let mut serial = SerialConfig::new(args.device);
    serial.baud_rate = args.baud;
    serial.subscribe_port = args.port;
    serial.forward_stdin = !args.no_stdin;

    let mut config = BridgeConfig::serial_only(serial);
    if let Some(host) = args.host {
        config.host = host;
    }

    run_bridge(&config)
}
