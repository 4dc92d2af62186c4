use assetlink_protocol::{ConnectionRegistry, ProtocolHandler, MAX_CHUNK_SIZE};

use crate::cmd::{connect, parse_duration, SendFileArgs};
use crate::exit::{io_error, protocol_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub fn run(args: SendFileArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let contents = std::fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;

    let remote_path = args
        .remote_path
        .clone()
        .unwrap_or_else(|| args.file.to_string_lossy().into_owned());

    let stream = connect(&args.addr, timeout)?;
    let registry = ConnectionRegistry::new();
    let mut handler = ProtocolHandler::from_tcp(stream, &registry)
        .map_err(|err| protocol_error("connection setup failed", err))?;

    handler
        .send_file(&remote_path, &contents, 1)
        .map_err(|err| protocol_error("file send failed", err))?;

    print_report(
        &[
            ("path", remote_path),
            ("bytes", contents.len().to_string()),
            ("chunks", contents.len().div_ceil(MAX_CHUNK_SIZE).to_string()),
        ],
        format,
    );
    Ok(SUCCESS)
}
