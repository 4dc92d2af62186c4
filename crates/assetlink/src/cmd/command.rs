use assetlink_protocol::{ConnectionRegistry, ProtocolHandler};

use crate::cmd::{connect, parse_duration, CommandArgs};
use crate::exit::{protocol_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub fn run(args: CommandArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let stream = connect(&args.addr, timeout)?;

    let registry = ConnectionRegistry::new();
    let mut handler = ProtocolHandler::from_tcp(stream, &registry)
        .map_err(|err| protocol_error("connection setup failed", err))?;

    handler
        .send_command(&args.command)
        .map_err(|err| protocol_error("command send failed", err))?;

    print_report(
        &[("addr", args.addr.clone()), ("command", args.command)],
        format,
    );
    Ok(SUCCESS)
}
