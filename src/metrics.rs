//! Latency and success-rate tracking for provider calls

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Number of samples kept per endpoint
const MAX_SAMPLES: usize = 100;

/// Which provider call a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Bulk market list
    Snapshot,
    /// Per-coin detail lookup
    Detail,
}

/// Aggregated figures for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointMetrics {
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
    /// Lifetime success rate, 0.0 to 1.0
    pub success_rate: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
}

impl EndpointMetrics {
    fn empty() -> Self {
        Self {
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
        }
    }
}

/// Metrics for the provider behind an engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchMetrics {
    pub provider_name: String,
    pub snapshot: EndpointMetrics,
    pub detail: EndpointMetrics,
}

#[derive(Debug, Default)]
struct Window {
    /// (latency ms, success)
    samples: VecDeque<(f64, bool)>,
    total: u64,
    failed: u64,
}

impl Window {
    fn record(&mut self, duration: Duration, success: bool) {
        self.total += 1;
        if !success {
            self.failed += 1;
        }
        if self.samples.len() >= MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples
            .push_back((duration.as_secs_f64() * 1000.0, success));
    }

    fn summarize(&self) -> EndpointMetrics {
        if self.total == 0 {
            return EndpointMetrics::empty();
        }

        // Only successful calls count towards latency.
        let mut latencies: Vec<f64> = self
            .samples
            .iter()
            .filter(|(_, success)| *success)
            .map(|(ms, _)| *ms)
            .collect();
        latencies.sort_by(|a, b| a.total_cmp(b));

        EndpointMetrics {
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: (self.total - self.failed) as f64 / self.total as f64,
            total_requests: self.total,
            failed_requests: self.failed,
        }
    }
}

/// Collects per-endpoint samples for one provider
pub struct MetricsCollector {
    provider_name: String,
    snapshot: Mutex<Window>,
    detail: Mutex<Window>,
}

impl MetricsCollector {
    pub fn new(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            snapshot: Mutex::new(Window::default()),
            detail: Mutex::new(Window::default()),
        }
    }

    fn window(&self, endpoint: Endpoint) -> &Mutex<Window> {
        match endpoint {
            Endpoint::Snapshot => &self.snapshot,
            Endpoint::Detail => &self.detail,
        }
    }

    /// Records one call with its duration and outcome
    pub fn record(&self, endpoint: Endpoint, duration: Duration, success: bool) {
        self.window(endpoint)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(duration, success);
    }

    /// Current figures for both endpoints
    pub fn get_metrics(&self) -> FetchMetrics {
        let summarize = |endpoint| {
            self.window(endpoint)
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .summarize()
        };

        FetchMetrics {
            provider_name: self.provider_name.clone(),
            snapshot: summarize(Endpoint::Snapshot),
            detail: summarize(Endpoint::Detail),
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
