//! Metrics collection for notary monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Notary metrics.
#[derive(Default)]
pub struct Metrics {
    /// Total notarization requests.
    pub requests_total: AtomicU64,
    /// Transactions finalized for the first time.
    pub notarized: AtomicU64,
    /// Repeat submissions answered from history.
    pub duplicates: AtomicU64,
    /// Requests refused.
    pub refused: AtomicU64,
    /// Requests in progress.
    pub active: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_received(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_notarized(&self) {
        self.notarized.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_refused(&self) {
        self.refused.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            notarized: self.notarized.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP accord_notary_requests_total Total notarization requests
# TYPE accord_notary_requests_total counter
accord_notary_requests_total {}

# HELP accord_notary_notarized Transactions finalized
# TYPE accord_notary_notarized counter
accord_notary_notarized {}

# HELP accord_notary_duplicates Repeat submissions
# TYPE accord_notary_duplicates counter
accord_notary_duplicates {}

# HELP accord_notary_refused Refused requests
# TYPE accord_notary_refused counter
accord_notary_refused {}

# HELP accord_notary_active Requests in progress
# TYPE accord_notary_active gauge
accord_notary_active {}
"#,
            snapshot.requests_total,
            snapshot.notarized,
            snapshot.duplicates,
            snapshot.refused,
            snapshot.active,
        )
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub notarized: u64,
    pub duplicates: u64,
    pub refused: u64,
    pub active: u64,
}
