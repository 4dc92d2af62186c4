use assetlink_protocol::{ConnectionRegistry, ProtocolHandler};

use crate::cmd::{connect, parse_duration, LogArgs};
use crate::exit::{protocol_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub fn run(args: LogArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let stream = connect(&args.addr, timeout)?;

    let registry = ConnectionRegistry::new();
    let mut handler = ProtocolHandler::from_tcp(stream, &registry)
        .map_err(|err| protocol_error("connection setup failed", err))?;

    handler
        .send_log(&args.message)
        .map_err(|err| protocol_error("log send failed", err))?;

    print_report(
        &[("addr", args.addr.clone()), ("message", args.message)],
        format,
    );
    Ok(SUCCESS)
}
