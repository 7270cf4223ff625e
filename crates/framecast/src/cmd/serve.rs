use framecast_hub::SerialConfig;

use crate::cmd::{load_config, run_bridge, ServeArgs};
use crate::exit::{CliError, CliResult, USAGE};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(device) = args.serial {
        match config.serial.as_mut() {
            Some(serial) => serial.device = device,
            None => config.serial = Some(SerialConfig::new(device)),
        }
    }

    match config.serial.as_mut() {
        Some(serial) => {
            if let Some(baud) = args.baud {
                serial.baud_rate = baud;
            }
            if args.no_stdin {
                serial.forward_stdin = false;
            }
        }
        None if args.baud.is_some() || args.no_stdin => {
            return Err(CliError::new(
                USAGE,
                "--baud and --no-stdin need a serial device (--serial or the config file)",
            ));
        }
        None => {}
    }

    run_bridge(&config)
}
