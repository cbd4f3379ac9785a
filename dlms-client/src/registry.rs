//! Bookkeeping of open meter connections
//!
//! The registry is constructed by the caller and handed to every
//! [`ConnectionBuilder`](crate::ConnectionBuilder) that should report to it.
//! It carries statistics only; no protocol decision depends on it.

use dlms_core::{DlmsError, DlmsResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counters for one open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub requests: u64,
    pub failures: u64,
    pub opened_at: Instant,
}

impl ConnectionStats {
    pub fn uptime(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

fn lock(records: &Mutex<HashMap<String, ConnectionStats>>) -> MutexGuard<'_, HashMap<String, ConnectionStats>> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared table of open connections keyed by meter id
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    records: Arc<Mutex<HashMap<String, ConnectionStats>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened connection
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if `meter_id` already has an open connection
    pub fn register(&self, meter_id: &str) -> DlmsResult<()> {
        let mut records = lock(&self.records);
        if records.contains_key(meter_id) {
            return Err(DlmsError::InvalidState(format!(
                "Meter {} already has an open connection",
                meter_id
            )));
        }
        records.insert(
            meter_id.to_string(),
            ConnectionStats {
                requests: 0,
                failures: 0,
                opened_at: Instant::now(),
            },
        );
        log::debug!("Registered connection to {} ({} open)", meter_id, records.len());
        Ok(())
    }

    /// Forget a connection; returns its final counters
    pub fn unregister(&self, meter_id: &str) -> Option<ConnectionStats> {
        let removed = lock(&self.records).remove(meter_id);
        if removed.is_some() {
            log::debug!("Unregistered connection to {}", meter_id);
        }
        removed
    }

    /// Count one request and whether it failed
    pub fn record_request(&self, meter_id: &str, success: bool) {
        if let Some(stats) = lock(&self.records).get_mut(meter_id) {
            stats.requests += 1;
            if !success {
                stats.failures += 1;
            }
        }
    }

    pub fn stats(&self, meter_id: &str) -> Option<ConnectionStats> {
        lock(&self.records).get(meter_id).copied()
    }

    pub fn is_open(&self, meter_id: &str) -> bool {
        lock(&self.records).contains_key(meter_id)
    }

    /// Meter ids with an open connection, sorted
    pub fn open_connections(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.records).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_once_per_meter() {
        let registry = ConnectionRegistry::new();
        registry.register("meter-2").unwrap();
        registry.register("meter-1").unwrap();
        assert!(matches!(registry.register("meter-1"), Err(DlmsError::InvalidState(_))));
        assert_eq!(registry.open_connections(), ["meter-1", "meter-2"]);
    }

    #[test]
    fn test_request_counters() {
        let registry = ConnectionRegistry::new();
        let handle = registry.clone();
        registry.register("meter-1").unwrap();
        handle.record_request("meter-1", true);
        handle.record_request("meter-1", false);
        handle.record_request("unknown", true);

        let stats = registry.stats("meter-1").unwrap();
        assert_eq!((stats.requests, stats.failures), (2, 1));

        let last = registry.unregister("meter-1").unwrap();
        assert_eq!(last.requests, 2);
        assert!(registry.is_empty());
        assert!(registry.unregister("meter-1").is_none());
    }
}
