use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};

/// Body served before any tick has been captured.
pub const EMPTY_SNAPSHOT: &str = r#"{"status":"fail","data":null}"#;

struct SinkState {
    snapshot: Option<Arc<String>>,
    version: u64,
}

/// Latest decoded tick, shared between the frame-processing thread and the
/// HTTP/WebSocket worker threads.
///
/// One mutex guards both the JSON document and its serialized form, so a
/// reader never observes a half-published tick. Publishing bumps a version
/// counter and signals a condvar for push-style subscribers.
pub struct TelemetrySink {
    state: Mutex<SinkState>,
    updated: Condvar,
}

impl TelemetrySink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                snapshot: None,
                version: 0,
            }),
            updated: Condvar::new(),
        }
    }

    /// Replace the snapshot with a freshly decoded tick.
    pub fn publish(&self, values: Value, ranges: Value) {
        let doc = json!({
            "status": "success",
            "data": { "values": values, "ranges": ranges },
        });
        let text = Arc::new(doc.to_string());

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.snapshot = Some(text);
        state.version += 1;
        self.updated.notify_all();
    }

    /// Serialized snapshot, or the fail document when nothing has been
    /// captured yet.
    pub fn snapshot_or_empty(&self) -> Arc<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .snapshot
            .clone()
            .unwrap_or_else(|| Arc::new(EMPTY_SNAPSHOT.to_string()))
    }

    /// Current publish counter; 0 until the first tick lands.
    pub fn version(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// The snapshot if it is newer than `seen`, without blocking.
    pub fn latest_since(&self, seen: u64) -> Option<(u64, Arc<String>)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.version > seen {
            state.snapshot.clone().map(|s| (state.version, s))
        } else {
            None
        }
    }

    /// Block up to `timeout` for a snapshot newer than `seen`.
    pub fn wait_for_update(&self, seen: u64, timeout: Duration) -> Option<(u64, Arc<String>)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (state, _) = self
            .updated
            .wait_timeout_while(state, timeout, |s| s.version <= seen)
            .unwrap_or_else(PoisonError::into_inner);
        if state.version > seen {
            state.snapshot.clone().map(|s| (state.version, s))
        } else {
            None
        }
    }
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self::new()
    }
}
