use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Label under which calls to unregistered methods are counted, so that
/// client-chosen names cannot grow `method_counts`.
pub const UNKNOWN_METHOD: &str = "<unknown>";

/// Call counters shared by every session of a server.
#[derive(Debug, Default)]
pub struct Metrics {
    total_calls: AtomicU64,
    total_ok: AtomicU64,
    total_failed: AtomicU64,
    /// Frames that never reached the dispatcher
    total_rejected: AtomicU64,
    total_duration_us: AtomicU64,
    method_counts: RwLock<BTreeMap<String, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    async fn record_call(&self, method: &str, ok: bool, duration_us: u64) {
        if ok {
            self.total_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_us.fetch_add(duration_us, Ordering::Relaxed);
        *self
            .method_counts
            .write()
            .await
            .entry(method.to_string())
            .or_insert(0) += 1;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let finished = self.total_ok.load(Ordering::Relaxed) + self.total_failed.load(Ordering::Relaxed);
        let avg_duration_us = match finished {
            0 => 0,
            n => self.total_duration_us.load(Ordering::Relaxed) / n,
        };

        MetricsSnapshot {
            total_calls,
            total_ok: self.total_ok.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            avg_duration_us,
            method_counts: self.method_counts.read().await.clone(),
        }
    }
}

/// Point-in-time copy of the counters, served on `GET /metrics`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub total_ok: u64,
    pub total_failed: u64,
    pub total_rejected: u64,
    pub avg_duration_us: u64,
    pub method_counts: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn log(&self) {
        info!(
            calls = self.total_calls,
            ok = self.total_ok,
            failed = self.total_failed,
            rejected = self.total_rejected,
            avg_us = self.avg_duration_us,
            "Call metrics"
        );
        for (method, count) in &self.method_counts {
            info!("  {}: {}", method, count);
        }
    }
}

/// Times one dispatched call and records its outcome.
pub struct CallTimer {
    method: String,
    start: Instant,
    metrics: Arc<Metrics>,
}

impl CallTimer {
    pub fn start(method: impl Into<String>, metrics: Arc<Metrics>) -> Self {
        let method = method.into();
        debug!("Call started: {}", method);
        metrics.total_calls.fetch_add(1, Ordering::Relaxed);
        Self {
            method,
            start: Instant::now(),
            metrics,
        }
    }

    pub async fn succeeded(self) {
        let elapsed = self.start.elapsed();
        debug!("Call completed: {} ({}us)", self.method, elapsed.as_micros());
        self.metrics
            .record_call(&self.method, true, elapsed.as_micros() as u64)
            .await;
    }

    pub async fn failed(self, error: &str) {
        let elapsed = self.start.elapsed();
        warn!("Call failed: {} - {} ({}us)", self.method, error, elapsed.as_micros());
        self.metrics
            .record_call(&self.method, false, elapsed.as_micros() as u64)
            .await;
    }
}

/// Initialize logging with tracing. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greet_rpc=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
