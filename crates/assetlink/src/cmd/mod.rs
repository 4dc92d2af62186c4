use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod command;
pub mod log;
pub mod ping;
pub mod send_file;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the asset agent: accept connections, receive files and
    /// commands, serve telemetry.
    Serve(ServeArgs),
    /// Check that an agent or game is reachable and measure round-trip
    /// time.
    Ping(PingArgs),
    /// Stream a file to the peer.
    SendFile(SendFileArgs),
    /// Send a command string.
    Command(CommandArgs),
    /// Forward a log line.
    Log(LogArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Ping(args) => ping::run(args, format),
        Command::SendFile(args) => send_file::run(args, format),
        Command::Command(args) => command::run(args, format),
        Command::Log(args) => log::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(default_value = "0.0.0.0:12340")]
    pub addr: String,
    /// Directory where received files are written.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out: PathBuf,
    /// Telemetry HTTP polling address.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8073")]
    pub telemetry_http: String,
    /// Telemetry WebSocket stream address.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8074")]
    pub telemetry_ws: String,
    /// Disable the telemetry web endpoints.
    #[arg(long)]
    pub no_telemetry: bool,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Address to connect to.
    pub addr: String,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SendFileArgs {
    /// Address to connect to.
    pub addr: String,
    /// Local file to send.
    pub file: PathBuf,
    /// Path presented to the receiver. Defaults to the local path.
    #[arg(long = "as", value_name = "PATH")]
    pub remote_path: Option<String>,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct CommandArgs {
    /// Address to connect to.
    pub addr: String,
    /// Command string to send.
    pub command: String,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Address to connect to.
    pub addr: String,
    /// Log line to forward.
    pub message: String,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

/// Resolve and connect with a bound on the connect itself.
pub fn connect(addr: &str, timeout: Duration) -> CliResult<TcpStream> {
    let resolved: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|err| io_error(&format!("failed resolving {addr}"), err))?
        .collect();
    let target = resolved
        .first()
        .ok_or_else(|| CliError::new(USAGE, format!("{addr} resolved to no addresses")))?;
    TcpStream::connect_timeout(target, timeout)
        .map_err(|err| io_error(&format!("failed connecting to {addr}"), err))
}
