// Monitoring - Store round-trip metrics and tracing setup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Per-operation counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    pub max_response_time_ms: f64,
}

/// Collects store round trips, keyed by operation name
#[derive(Debug, Default)]
pub struct MetricsCollector {
    operations: RwLock<HashMap<String, OperationMetrics>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, operation: &str, duration: Duration, success: bool) {
        let mut operations = self.operations.write().await;
        let metrics = operations.entry(operation.to_string()).or_default();

        metrics.total_calls += 1;
        if success {
            metrics.success_count += 1;
        } else {
            metrics.error_count += 1;
        }

        let duration_ms = duration.as_secs_f64() * 1000.0;
        metrics.avg_response_time_ms = (metrics.avg_response_time_ms
            * (metrics.total_calls - 1) as f64
            + duration_ms)
            / metrics.total_calls as f64;
        metrics.max_response_time_ms = metrics.max_response_time_ms.max(duration_ms);
    }

    /// Mark a store call as started; returns the number now in flight
    pub fn call_started(&self) -> usize {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        now
    }

    pub fn call_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous store calls seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub async fn calls(&self, operation: &str) -> u64 {
        self.operations
            .read()
            .await
            .get(operation)
            .map(|m| m.total_calls)
            .unwrap_or(0)
    }

    pub async fn total_calls(&self) -> u64 {
        self.operations.read().await.values().map(|m| m.total_calls).sum()
    }

    pub async fn snapshot(&self) -> HashMap<String, OperationMetrics> {
        self.operations.read().await.clone()
    }

    pub async fn reset(&self) {
        self.operations.write().await.clear();
        self.peak_in_flight.store(self.in_flight(), Ordering::SeqCst);
    }
}

/// Install the global tracing subscriber.
///
/// `filter` takes precedence over `RUST_LOG`; with neither set the level is
/// `info`. Calling this more than once is harmless.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
