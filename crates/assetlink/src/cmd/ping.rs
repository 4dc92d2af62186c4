use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assetlink_frame::tags;
use assetlink_protocol::{
    ConnectionRegistry, MessageListener, ProtocolContext, ProtocolHandler, Result as ProtocolResult,
};
use assetlink_wire::{FourCc, WireBuffer};

use crate::cmd::{connect, parse_duration, PingArgs};
use crate::exit::{protocol_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_report, OutputFormat};

struct PongWaiter {
    seen: Arc<AtomicBool>,
}

impl MessageListener for PongWaiter {
    fn handle_message(
        &mut self,
        tag: FourCc,
        _ctx: &mut dyn ProtocolContext,
        _payload: &mut WireBuffer<'_>,
    ) -> ProtocolResult<bool> {
        if tag != tags::PONG {
            return Ok(false);
        }
        self.seen.store(true, Ordering::SeqCst);
        Ok(true)
    }
}

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let stream = connect(&args.addr, timeout)?;

    let registry = ConnectionRegistry::new();
    let mut handler = ProtocolHandler::from_tcp(stream, &registry)
        .map_err(|err| protocol_error("connection setup failed", err))?;

    let seen = Arc::new(AtomicBool::new(false));
    handler.register_listener(Box::new(PongWaiter {
        seen: Arc::clone(&seen),
    }));

    let started = Instant::now();
    handler
        .send_ping()
        .map_err(|err| protocol_error("ping send failed", err))?;

    while !seen.load(Ordering::SeqCst) {
        if started.elapsed() > timeout {
            return Err(CliError::new(
                TIMEOUT,
                format!("no reply from {} within {}", args.addr, args.timeout),
            ));
        }
        if !handler
            .process()
            .map_err(|err| protocol_error("ping failed", err))?
        {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    let rtt = started.elapsed();

    print_report(
        &[
            ("addr", args.addr.clone()),
            ("rtt_ms", format!("{:.3}", rtt.as_secs_f64() * 1e3)),
        ],
        format,
    );
    Ok(SUCCESS)
}
