//! Simulation metrics.

use std::collections::{BTreeMap, VecDeque};

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Issuances attempted.
    pub total_issuances: u64,
    /// Issuances that reached finality.
    pub finalized: u64,
    /// Issuances that failed, for any reason.
    pub failed: u64,
    /// Failures by error code.
    pub failures_by_code: BTreeMap<&'static str, u64>,
    /// Latency samples (ms).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_issuances: 0,
            finalized: 0,
            failed: 0,
            failures_by_code: BTreeMap::new(),
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a finalized issuance.
    pub fn record_success(&mut self, latency_ms: u64) {
        self.total_issuances += 1;
        self.finalized += 1;

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_ms);
    }

    /// Record a failed issuance.
    pub fn record_failure(&mut self, code: &'static str) {
        self.total_issuances += 1;
        self.failed += 1;
        *self.failures_by_code.entry(code).or_insert(0) += 1;
    }

    /// Get average latency in ms.
    pub fn average_latency_ms(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p99 latency.
    pub fn p99_latency_ms(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_issuances == 0 {
            return 0.0;
        }

        self.finalized as f64 / self.total_issuances as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_success(100);
        metrics.record_success(200);
        metrics.record_success(150);
        metrics.record_failure("REJECTED");

        assert_eq!(metrics.total_issuances, 4);
        assert_eq!(metrics.finalized, 3);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.failures_by_code.get("REJECTED"), Some(&1));
        assert_eq!(metrics.average_latency_ms(), 150);
        assert_eq!(metrics.p99_latency_ms(), 200);
        assert_eq!(metrics.success_rate(), 0.75);
    }
}
