//! Per-incident write serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Hands out one mutex per incident id so that writers to the same incident
/// are serialized while different incidents proceed independently.
#[derive(Debug, Default)]
pub struct IncidentLocks {
    registry: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IncidentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, incident_id: &str) -> Arc<Mutex<()>> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .entry(incident_id.to_string())
            .or_default()
            .clone()
    }

    /// Run `f` while holding the lock for `incident_id`.
    ///
    /// The guarded value is `()`, so a poisoned lock carries no broken state
    /// and is simply taken over.
    pub fn with_lock<T>(&self, incident_id: &str, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(incident_id);
        let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of incidents that have been locked at least once.
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_incident_is_serialized() {
        let locks = Arc::new(IncidentLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..50 {
                        locks.with_lock("INC-2026-000001", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_distinct_incidents_get_distinct_locks() {
        let locks = IncidentLocks::new();
        let nested = locks.with_lock("INC-A", || locks.with_lock("INC-B", || 42));
        assert_eq!(nested, 42);
        assert_eq!(locks.len(), 2);
    }
}
