use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::{Message, WebSocket};

use crate::error::{Result, TelemetryError};
use crate::sink::TelemetrySink;

/// Poll granularity for shutdown checks and snapshot pushes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const STREAM_PATH: &str = "/stream";

#[derive(Debug, Clone)]
pub struct TelemetryServerConfig {
    /// Address of the JSON polling endpoint (`GET /tick`).
    pub http_addr: String,
    /// Address of the WebSocket push endpoint (`/stream`).
    pub ws_addr: String,
    /// Subscriber slots; a full table rejects new connections.
    pub max_clients: usize,
}

impl Default for TelemetryServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8073".to_string(),
            ws_addr: "127.0.0.1:8074".to_string(),
            max_clients: 5,
        }
    }
}

/// Fixed-size admission control for stream subscribers.
///
/// Telemetry viewers are a dev-time convenience; rejecting the sixth
/// connection beats growing without bound.
struct ClientSlots {
    active: AtomicUsize,
    max: usize,
}

impl ClientSlots {
    fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    fn try_acquire(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Serves the latest tick snapshot over HTTP polling and WebSocket push.
pub struct TelemetryServer {
    shutdown: Arc<AtomicBool>,
    http_addr: SocketAddr,
    ws_addr: SocketAddr,
    workers: Vec<JoinHandle<()>>,
    clients: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TelemetryServer {
    pub fn start(sink: Arc<TelemetrySink>, config: TelemetryServerConfig) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));

        let http = tiny_http::Server::http(config.http_addr.as_str())
            .map_err(|err| TelemetryError::Server(format!("http bind failed: {err}")))?;
        let http_addr = http
            .server_addr()
            .to_ip()
            .ok_or_else(|| TelemetryError::Server("http listener has no ip address".to_string()))?;

        let ws_listener = TcpListener::bind(config.ws_addr.as_str())?;
        let ws_addr = ws_listener.local_addr()?;
        ws_listener.set_nonblocking(true)?;

        info!(http = %http_addr, ws = %ws_addr, "telemetry server listening");

        let mut workers = Vec::new();

        let http_sink = Arc::clone(&sink);
        let http_shutdown = Arc::clone(&shutdown);
        workers.push(thread::spawn(move || {
            http_worker(http, http_sink, http_shutdown);
        }));

        let slots = Arc::new(ClientSlots::new(config.max_clients));
        let clients = Arc::new(Mutex::new(Vec::new()));
        let ws_shutdown = Arc::clone(&shutdown);
        let ws_clients = Arc::clone(&clients);
        workers.push(thread::spawn(move || {
            ws_acceptor(ws_listener, sink, slots, ws_clients, ws_shutdown);
        }));

        Ok(Self {
            shutdown,
            http_addr,
            ws_addr,
            workers,
            clients,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Stop accepting, wake the workers and join them, then join every
    /// connected stream client. Each client observes the flag within one
    /// poll interval and closes its socket before exiting.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("telemetry worker panicked during shutdown");
            }
        }
        // Acceptor has joined by now, so no new clients can appear.
        let clients = std::mem::take(
            &mut *self
                .clients
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for client in clients {
            if client.join().is_err() {
                warn!("stream client thread panicked during shutdown");
            }
        }
    }
}

fn http_worker(server: tiny_http::Server, sink: Arc<TelemetrySink>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => respond(request, &sink),
            Ok(None) => {}
            Err(err) => {
                debug!(error = %err, "http receive error");
            }
        }
    }
}

fn respond(request: tiny_http::Request, sink: &TelemetrySink) {
    let (status, body) = if request.method() == &tiny_http::Method::Get && request.url() == "/tick"
    {
        (200, sink.snapshot_or_empty().as_str().to_string())
    } else {
        (404, crate::sink::EMPTY_SNAPSHOT.to_string())
    };

    let mut response = tiny_http::Response::from_string(body).with_status_code(status);
    if let Ok(content_type) =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
    {
        response = response.with_header(content_type);
    }
    if let Err(err) = request.respond(response) {
        debug!(error = %err, "http respond failed");
    }
}

fn ws_acceptor(
    listener: TcpListener,
    sink: Arc<TelemetrySink>,
    slots: Arc<ClientSlots>,
    clients: Arc<Mutex<Vec<JoinHandle<()>>>>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        reap_finished(&clients);
        match listener.accept() {
            Ok((stream, peer)) => {
                if !slots.try_acquire() {
                    warn!(%peer, "stream client table full, rejecting connection");
                    drop(stream);
                    continue;
                }
                debug!(%peer, "stream client connected");
                let sink = Arc::clone(&sink);
                let slots = Arc::clone(&slots);
                let shutdown = Arc::clone(&shutdown);
                let handle = thread::spawn(move || {
                    ws_client(stream, sink, shutdown);
                    slots.release();
                    debug!(%peer, "stream client disconnected");
                });
                clients
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(handle);
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!(error = %err, "stream accept failed");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

// Keeps the handle table bounded while clients come and go.
fn reap_finished(clients: &Mutex<Vec<JoinHandle<()>>>) {
    let mut table = clients.lock().unwrap_or_else(PoisonError::into_inner);
    let mut index = 0;
    while index < table.len() {
        if table[index].is_finished() {
            let _ = table.swap_remove(index).join();
        } else {
            index += 1;
        }
    }
}

fn ws_client(stream: TcpStream, sink: Arc<TelemetrySink>, shutdown: Arc<AtomicBool>) {
    if stream.set_nonblocking(false).is_err() {
        return;
    }

    let check_path = |request: &Request, response: Response| {
        if request.uri().path() == STREAM_PATH {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(None);
            *rejection.status_mut() = tungstenite::http::StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let mut ws = match tungstenite::accept_hdr(stream, check_path) {
        Ok(ws) => ws,
        Err(err) => {
            debug!(error = %err, "stream handshake failed");
            return;
        }
    };

    // Bound reads so the loop can interleave pushes and shutdown checks.
    if ws
        .get_ref()
        .set_read_timeout(Some(POLL_INTERVAL))
        .is_err()
    {
        return;
    }

    let mut seen = 0;
    loop {
        if shutdown.load(Ordering::Acquire) {
            let _ = ws.close(None);
            return;
        }

        if let Some((version, text)) = sink.latest_since(seen) {
            seen = version;
            if ws.send(Message::Text(text.as_str().to_string())).is_err() {
                return;
            }
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                if text != "ping" && !reply_pong(&mut ws) {
                    return;
                }
            }
            Ok(Message::Close(_)) => return,
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(tungstenite::Error::ConnectionClosed) => return,
            Err(err) => {
                debug!(error = %err, "stream client error");
                return;
            }
        }
    }
}

fn reply_pong(ws: &mut WebSocket<TcpStream>) -> bool {
    ws.send(Message::Text(
        r#"{"status":"success","data":"pong"}"#.to_string(),
    ))
    .is_ok()
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use serde_json::{json, Value};

    use super::*;

    fn local_config(max_clients: usize) -> TelemetryServerConfig {
        TelemetryServerConfig {
            http_addr: "127.0.0.1:0".to_string(),
            ws_addr: "127.0.0.1:0".to_string(),
            max_clients,
        }
    }

    fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).expect("connect should succeed");
        write!(stream, "GET {path} HTTP/1.0\r\nHost: localhost\r\n\r\n")
            .expect("request write should succeed");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .expect("response read should succeed");
        response
    }

    #[test]
    fn tick_endpoint_serves_fail_then_snapshot() {
        let sink = Arc::new(TelemetrySink::new());
        let server =
            TelemetryServer::start(Arc::clone(&sink), local_config(5)).expect("server start");

        let empty = http_get(server.http_addr(), "/tick");
        assert!(empty.contains(r#""status":"fail""#));

        sink.publish(json!([{ "id": 0, "name": "fps", "value": 60.0 }]), json!([]));
        let body = http_get(server.http_addr(), "/tick");
        let json_start = body.find("\r\n\r\n").expect("header terminator") + 4;
        let doc: Value = serde_json::from_str(&body[json_start..]).unwrap();
        assert_eq!(doc["status"], "success");
        assert_eq!(doc["data"]["values"][0]["name"], "fps");

        server.shutdown();
    }

    #[test]
    fn unknown_paths_get_404() {
        let sink = Arc::new(TelemetrySink::new());
        let server = TelemetryServer::start(sink, local_config(5)).expect("server start");
        let response = http_get(server.http_addr(), "/nope");
        assert!(response.starts_with("HTTP/1.0 404") || response.starts_with("HTTP/1.1 404"));
        server.shutdown();
    }

    #[test]
    fn stream_pushes_each_published_snapshot() {
        let sink = Arc::new(TelemetrySink::new());
        let server =
            TelemetryServer::start(Arc::clone(&sink), local_config(5)).expect("server start");

        let url = format!("ws://{}{STREAM_PATH}", server.ws_addr());
        let (mut client, _) = tungstenite::connect(url).expect("ws connect should succeed");

        sink.publish(json!([]), json!([{ "id": 0, "name": "frame" }]));
        let message = client.read().expect("push expected");
        let doc: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        assert_eq!(doc["data"]["ranges"][0]["name"], "frame");

        server.shutdown();
    }

    #[test]
    fn full_client_table_rejects_connections() {
        let sink = Arc::new(TelemetrySink::new());
        let server = TelemetryServer::start(sink, local_config(0)).expect("server start");

        let url = format!("ws://{}{STREAM_PATH}", server.ws_addr());
        assert!(tungstenite::connect(url).is_err());

        server.shutdown();
    }

    #[test]
    fn shutdown_joins_connected_stream_clients() {
        let sink = Arc::new(TelemetrySink::new());
        let server = TelemetryServer::start(sink, local_config(5)).expect("server start");

        let url = format!("ws://{}{STREAM_PATH}", server.ws_addr());
        let (mut client, _) = tungstenite::connect(url).expect("ws connect should succeed");

        // Returns only after the client thread has closed its socket.
        server.shutdown();

        loop {
            match client.read() {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    #[test]
    fn slots_cap_and_release() {
        let slots = ClientSlots::new(2);
        assert!(slots.try_acquire());
        assert!(slots.try_acquire());
        assert!(!slots.try_acquire());
        slots.release();
        assert!(slots.try_acquire());
    }
}
