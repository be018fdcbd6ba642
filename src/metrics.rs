//! Engine counters shared by every node instance of a topology.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters. Nodes hold an `Arc<EngineMetrics>` and bump them as they work.
#[derive(Debug)]
pub struct EngineMetrics {
    started: Instant,
    pub facts_received: AtomicU64,
    pub filter_bindings: AtomicU64,
    pub join_matches: AtomicU64,
    pub window_evictions: AtomicU64,
    pub fires: AtomicU64,
    pub guard_rejections: AtomicU64,
    pub facts_inferred: AtomicU64,
    pub facts_rejected: AtomicU64,
    pub facts_reinjected: AtomicU64,
    pub sink_errors: AtomicU64,
    pub failed_deliveries: AtomicU64,
    pub dropped_deliveries: AtomicU64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            facts_received: AtomicU64::new(0),
            filter_bindings: AtomicU64::new(0),
            join_matches: AtomicU64::new(0),
            window_evictions: AtomicU64::new(0),
            fires: AtomicU64::new(0),
            guard_rejections: AtomicU64::new(0),
            facts_inferred: AtomicU64::new(0),
            facts_rejected: AtomicU64::new(0),
            facts_reinjected: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            failed_deliveries: AtomicU64::new(0),
            dropped_deliveries: AtomicU64::new(0),
        }
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            facts_received: get(&self.facts_received),
            filter_bindings: get(&self.filter_bindings),
            join_matches: get(&self.join_matches),
            window_evictions: get(&self.window_evictions),
            fires: get(&self.fires),
            guard_rejections: get(&self.guard_rejections),
            facts_inferred: get(&self.facts_inferred),
            facts_rejected: get(&self.facts_rejected),
            facts_reinjected: get(&self.facts_reinjected),
            sink_errors: get(&self.sink_errors),
            failed_deliveries: get(&self.failed_deliveries),
            dropped_deliveries: get(&self.dropped_deliveries),
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub facts_received: u64,
    pub filter_bindings: u64,
    pub join_matches: u64,
    pub window_evictions: u64,
    pub fires: u64,
    pub guard_rejections: u64,
    pub facts_inferred: u64,
    pub facts_rejected: u64,
    pub facts_reinjected: u64,
    pub sink_errors: u64,
    pub failed_deliveries: u64,
    pub dropped_deliveries: u64,
    pub elapsed_seconds: f64,
}

impl MetricsSnapshot {
    pub fn facts_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.facts_received as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Accepted head facts per fire event.
    pub fn facts_per_fire(&self) -> f64 {
        if self.fires > 0 {
            self.facts_inferred as f64 / self.fires as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = EngineMetrics::new();
        EngineMetrics::incr(&metrics.facts_received);
        EngineMetrics::add(&metrics.join_matches, 3);

        let snap = metrics.snapshot();
        assert_eq!(snap.facts_received, 1);
        assert_eq!(snap.join_matches, 3);
        assert_eq!(snap.fires, 0);
        assert_eq!(snap.facts_per_fire(), 0.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_string(&MetricsSnapshot::default()).unwrap();
        assert!(json.contains("\"facts_inferred\":0"));
    }
}
