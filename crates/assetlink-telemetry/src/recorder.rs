use std::thread::{self, ThreadId};
use std::time::Instant;

use assetlink_wire::WireBuffer;
use bytes::Bytes;
use tracing::info;

use crate::error::{Result, TelemetryError};
use crate::metrics::{MetricId, TickMetricRange, TickMetricValue};
use crate::table::MetricTable;

/// Per-tick metric recording: named values plus a call tree of timed
/// ranges.
///
/// Enable state is double-buffered: `enable`/`disable` set a pending flag
/// that takes effect at the next `begin_tick`, so a tick is never half
/// recorded. Recording is restricted to the thread that called
/// `begin_tick`; calls from any other thread are silently ignored, which
/// keeps the per-event hot path lock-free at the cost of profiling a
/// single timeline.
pub struct TelemetryRecorder {
    enabled: bool,
    pending_enabled: bool,
    values: MetricTable<TickMetricValue>,
    ranges: MetricTable<TickMetricRange>,
    stack: Vec<String>,
    tick_timer: Instant,
    tick_thread: Option<ThreadId>,
    tick_id: i32,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            enabled: false,
            pending_enabled: false,
            values: MetricTable::new(),
            ranges: MetricTable::new(),
            stack: Vec::new(),
            tick_timer: Instant::now(),
            tick_thread: None,
            tick_id: 0,
        }
    }

    /// Request recording; takes effect at the next `begin_tick`.
    pub fn enable(&mut self) {
        self.pending_enabled = true;
    }

    /// Request a stop; takes effect at the next `begin_tick`.
    pub fn disable(&mut self) {
        self.pending_enabled = false;
    }

    /// The requested state, which may not be active yet.
    pub fn is_enabled(&self) -> bool {
        self.pending_enabled
    }

    /// Id of the tick currently being recorded.
    pub fn tick_id(&self) -> i32 {
        self.tick_id
    }

    pub fn values(&self) -> &MetricTable<TickMetricValue> {
        &self.values
    }

    pub fn ranges(&self) -> &MetricTable<TickMetricRange> {
        &self.ranges
    }

    fn recording(&self) -> bool {
        self.enabled && self.tick_thread == Some(thread::current().id())
    }

    fn elapsed_ns(&self) -> f64 {
        self.tick_timer.elapsed().as_secs_f64() * 1e9
    }

    /// Start a tick: apply pending enable state, clear both tables and the
    /// range stack, restart the tick timer and claim the calling thread as
    /// the recording thread.
    pub fn begin_tick(&mut self) {
        if self.enabled != self.pending_enabled {
            self.enabled = self.pending_enabled;
            info!(
                enabled = self.enabled,
                "telemetry {}",
                if self.enabled { "enabled" } else { "disabled" }
            );
        }
        if !self.enabled {
            return;
        }

        self.tick_thread = Some(thread::current().id());
        self.values.reset();
        self.ranges.reset();
        self.stack.clear();
        self.tick_timer = Instant::now();

        let tick_id = self.tick_id;
        self.set_tick_value("tickId", f64::from(tick_id));
    }

    /// Record a named value for the current tick. The first write of a
    /// name gets the next sequence id; later writes in the same tick update
    /// the value and keep the id.
    pub fn set_tick_value(&mut self, name: &str, value: f64) -> Option<MetricId> {
        if !self.recording() {
            return None;
        }
        if let Some(stored) = self.values.get_mut(name) {
            stored.value = value;
            return Some(stored.id);
        }
        let stored = self.values.insert(name, TickMetricValue { id: 0, value });
        Some(stored.id)
    }

    /// Open a timed range named `name` under the current top of stack.
    ///
    /// A same-named range already in the table (recursion, or a missing
    /// end) gets a disambiguated `"<name>.<n>"` key so both spans keep
    /// distinct slots, and the original's duplicate counters are bumped.
    pub fn begin_tick_timer(&mut self, name: &str) {
        if !self.recording() {
            return;
        }

        let key = match self.ranges.get_mut(name) {
            Some(existing) => {
                existing.duplicates += 1;
                existing.duplicates_on_stack += 1;
                format!("{name}.{}", existing.duplicates + 1)
            }
            None => name.to_string(),
        };

        let parent_key = self.stack.last().cloned();
        let (parent, level, sibling) = match parent_key
            .as_deref()
            .and_then(|k| self.ranges.get_mut(k))
        {
            Some(parent) => {
                let sibling = parent.children;
                parent.children += 1;
                (parent.id, parent.level + 1, sibling)
            }
            None => (-1, 0, 0),
        };

        let begin_ns = self.elapsed_ns();
        self.ranges.insert(
            &key,
            TickMetricRange {
                id: 0,
                parent,
                level,
                children: 0,
                sibling,
                duplicates: 0,
                duplicates_on_stack: 0,
                begin_ns,
                end_ns: 0.0,
            },
        );
        self.stack.push(key);
    }

    /// Close the most recently opened range.
    ///
    /// With interleaved same-named spans the name given here can differ
    /// from the span actually on top of the stack; in that case the named
    /// entry's open-duplicate counter is decremented instead of erroring.
    /// Driving that counter negative means begins and ends genuinely do
    /// not pair up, which is fatal.
    pub fn end_tick_timer(&mut self, name: &str) -> Result<()> {
        if !self.recording() {
            return Ok(());
        }

        let end_ns = self.elapsed_ns();
        let top_key = self
            .stack
            .pop()
            .ok_or_else(|| TelemetryError::MismatchedTimer(name.to_string()))?;

        let top_id = {
            let top = self
                .ranges
                .get_mut(&top_key)
                .ok_or_else(|| TelemetryError::MismatchedTimer(top_key.clone()))?;
            top.end_ns = end_ns;
            top.id
        };

        let named = self
            .ranges
            .get_mut(name)
            .ok_or_else(|| TelemetryError::MismatchedTimer(name.to_string()))?;
        if named.id != top_id {
            named.duplicates_on_stack -= 1;
            if named.duplicates_on_stack < 0 {
                return Err(TelemetryError::MismatchedTimer(name.to_string()));
            }
        }
        Ok(())
    }

    /// Finish the tick: serialize both tables back-to-back and return the
    /// payload bytes, ready to send under the telemetry tag.
    ///
    /// Returns `Ok(None)` while disabled. Open ranges at this point mean
    /// mismatched begin/end calls and are fatal.
    pub fn end_tick(&mut self) -> Result<Option<Bytes>> {
        if !self.enabled {
            return Ok(None);
        }
        if !self.stack.is_empty() {
            return Err(TelemetryError::UnbalancedTick {
                open: self.stack.len(),
            });
        }

        let mut buf =
            WireBuffer::with_capacity(self.values.wire_size() + self.ranges.wire_size());
        self.values.write(&mut buf)?;
        self.ranges.write(&mut buf)?;
        self.tick_id += 1;
        Ok(Some(buf.into_bytes()))
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
