use crate::cmd::SubsystemsArgs;
use crate::demux::Demux;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_subsystems, OutputFormat};

pub fn run(args: SubsystemsArgs, format: OutputFormat) -> CliResult<i32> {
    let demux = Demux::new(&args.hub, format)?;
    print_subsystems(&demux.hub().registry().list(), format);
    Ok(SUCCESS)
}
