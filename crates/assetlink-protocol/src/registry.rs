use std::sync::atomic::{AtomicU32, Ordering};

/// First connection id handed out; leaves room below for sentinel values.
const FIRST_CONNECTION_ID: u32 = 1000;

/// Hands out process-wide unique connection ids.
///
/// Ids are monotonically increasing and never reused, so log lines and
/// telemetry can refer to a connection unambiguously across reconnects.
#[derive(Debug)]
pub struct ConnectionRegistry {
    next_id: AtomicU32,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(FIRST_CONNECTION_ID),
        }
    }

    /// Assign the next connection id.
    pub fn next_connection_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let registry = ConnectionRegistry::new();
        let a = registry.next_connection_id();
        let b = registry.next_connection_id();
        let c = registry.next_connection_id();
        assert_eq!(a, 1000);
        assert_eq!(b, a + 1);
        assert_eq!(c, b + 1);
    }

    #[test]
    fn ids_are_unique_across_threads() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..64)
                    .map(|_| registry.next_connection_id())
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread should finish") {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
    }
}
