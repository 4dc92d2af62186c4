use std::sync::Arc;

use assetlink_frame::tags;
use assetlink_protocol::{MessageListener, ProtocolContext};
use assetlink_wire::{FourCc, WireBuffer};
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};
use crate::metrics::{TickMetricRange, TickMetricValue};
use crate::sink::TelemetrySink;
use crate::table::MetricTable;

/// Decode one tick payload: heterogeneous tables back-to-back, each
/// self-describing via its type byte.
pub fn decode_tick(
    payload: &mut WireBuffer<'_>,
) -> Result<(MetricTable<TickMetricValue>, MetricTable<TickMetricRange>)> {
    let mut values = MetricTable::new();
    let mut ranges = MetricTable::new();
    while !payload.is_exhausted() {
        if values.read(payload)? {
            continue;
        }
        if ranges.read(payload)? {
            continue;
        }
        let ty = payload.read_u8()?;
        return Err(TelemetryError::UnknownTableType(ty));
    }
    Ok((values, ranges))
}

/// Claims tick telemetry frames and republishes their decoded snapshot.
///
/// Decode failures drop the frame with a warning rather than killing the
/// connection; the viewer facade is best-effort and the next tick replaces
/// everything anyway.
pub struct TelemetryListener {
    sink: Arc<TelemetrySink>,
}

impl TelemetryListener {
    pub fn new(sink: Arc<TelemetrySink>) -> Self {
        Self { sink }
    }
}

impl MessageListener for TelemetryListener {
    fn handle_message(
        &mut self,
        tag: FourCc,
        ctx: &mut dyn ProtocolContext,
        payload: &mut WireBuffer<'_>,
    ) -> assetlink_protocol::Result<bool> {
        if tag != tags::TELE {
            return Ok(false);
        }

        match decode_tick(payload) {
            Ok((values, ranges)) => {
                debug!(
                    connection = ctx.connection_id(),
                    values = values.len(),
                    ranges = ranges.len(),
                    "tick snapshot received"
                );
                self.sink
                    .publish(values.to_json_array(), ranges.to_json_array());
            }
            Err(err) => {
                warn!(
                    connection = ctx.connection_id(),
                    error = %err,
                    "discarding malformed telemetry frame"
                );
            }
        }
        Ok(true)
    }
}
