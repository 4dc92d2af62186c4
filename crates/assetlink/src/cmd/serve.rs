use std::net::{TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assetlink_protocol::{
    CommandListener, ConnectionRegistry, FileTransferListener, ProtocolHandler,
};
use assetlink_telemetry::{TelemetryListener, TelemetryServer, TelemetryServerConfig, TelemetrySink};
use bytes::Bytes;
use tracing::{error, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{io_error, telemetry_error, CliError, CliResult, SUCCESS};
use crate::output::OutputFormat;

const IDLE_SLEEP: Duration = Duration::from_millis(10);

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind(&args.addr)
        .map_err(|err| io_error(&format!("failed binding {}", args.addr), err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("failed configuring listener", err))?;
    info!(addr = %args.addr, out = %args.out.display(), "asset agent listening");

    let sink = Arc::new(TelemetrySink::new());
    let telemetry = if args.no_telemetry {
        None
    } else {
        let config = TelemetryServerConfig {
            http_addr: args.telemetry_http.clone(),
            ws_addr: args.telemetry_ws.clone(),
            ..TelemetryServerConfig::default()
        };
        Some(
            TelemetryServer::start(Arc::clone(&sink), config)
                .map_err(|err| telemetry_error("telemetry server start failed", err))?,
        )
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let registry = ConnectionRegistry::new();
    let mut connections: Vec<ProtocolHandler<TcpStream, TcpStream>> = Vec::new();

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => match accept_connection(stream, &registry, &args.out, &sink) {
                Ok(handler) => {
                    info!(%peer, connection = handler.connection_id(), "client connected");
                    connections.push(handler);
                }
                Err(err) => warn!(%peer, error = %err, "connection setup failed"),
            },
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(err) => warn!(error = %err, "accept failed"),
        }

        let mut progressed = false;
        connections.retain_mut(|handler| loop {
            match handler.process() {
                Ok(true) => progressed = true,
                Ok(false) => break true,
                Err(err) if !err.is_fatal() => {
                    warn!(
                        connection = handler.connection_id(),
                        error = %err,
                        "ignoring recoverable protocol error"
                    );
                    progressed = true;
                }
                Err(err) => {
                    warn!(
                        connection = handler.connection_id(),
                        peer = handler.description(),
                        error = %err,
                        "dropping connection"
                    );
                    break false;
                }
            }
        });

        if !progressed {
            std::thread::sleep(IDLE_SLEEP);
        }
    }

    info!("shutting down");
    if let Some(server) = telemetry {
        server.shutdown();
    }
    Ok(SUCCESS)
}

fn accept_connection(
    stream: TcpStream,
    registry: &ConnectionRegistry,
    out_dir: &Path,
    sink: &Arc<TelemetrySink>,
) -> assetlink_protocol::Result<ProtocolHandler<TcpStream, TcpStream>> {
    let mut handler = ProtocolHandler::from_tcp(stream, registry)?;

    let destination = out_dir.to_path_buf();
    handler.register_listener(Box::new(FileTransferListener::new(
        move |path, contents| {
            store_file(&destination, path, &contents);
        },
    )));
    handler.register_listener(Box::new(CommandListener::new(|command| {
        info!(command, "command received");
    })));
    handler.register_listener(Box::new(TelemetryListener::new(Arc::clone(sink))));

    Ok(handler)
}

fn store_file(out_dir: &Path, path: &str, contents: &Bytes) {
    let target = out_dir.join(sanitize_rel_path(path));
    if let Some(parent) = target.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            error!(path, error = %err, "failed creating directories for received file");
            return;
        }
    }
    match std::fs::write(&target, contents) {
        Ok(()) => info!(path, target = %target.display(), bytes = contents.len(), "file stored"),
        Err(err) => error!(path, error = %err, "failed writing received file"),
    }
}

// Peer-supplied paths never escape the output directory.
fn sanitize_rel_path(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
