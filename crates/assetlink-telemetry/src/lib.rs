//! Per-tick metric recording and the viewer-facing telemetry facade.
//!
//! The recording side lives in the instrumented process: named values and a
//! call tree of timed ranges, captured per tick and serialized as
//! self-describing tables into a single telemetry frame payload. The viewer
//! side decodes those payloads into a JSON snapshot and serves it over an
//! HTTP polling endpoint and a WebSocket push stream.

pub mod error;
pub mod listener;
pub mod metrics;
pub mod recorder;
pub mod server;
pub mod sink;
pub mod table;

pub use error::{Result, TelemetryError};
pub use listener::{decode_tick, TelemetryListener};
pub use metrics::{MetricId, MetricRecord, TickMetricRange, TickMetricValue};
pub use recorder::TelemetryRecorder;
pub use server::{TelemetryServer, TelemetryServerConfig};
pub use sink::{TelemetrySink, EMPTY_SNAPSHOT};
pub use table::{MetricTable, TABLE_HEADER_SIZE};
