use crate::cmd::{load_config, ChannelsArgs};
use crate::exit::{bridge_error, CliResult, SUCCESS};
use crate::output::{print_channels, OutputFormat};

pub fn run(args: ChannelsArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(args.config.as_deref())?;
    config
        .validate()
        .map_err(|err| bridge_error("invalid configuration", err))?;

    print_channels(&config, format);
    Ok(SUCCESS)
}
