//! Reload metrics tracking using OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for credential store reloads.
///
/// Every measurement carries a `path` attribute naming the backing file.
///
/// # Examples
///
/// ```rust,no_run
/// use credstore_reload::metrics::StoreMetrics;
/// use opentelemetry::global;
///
/// let metrics = StoreMetrics::new(global::meter("credstore"), "/etc/creds/store.yaml");
///
/// let timer = metrics.start_reload();
/// // ... perform reload ...
/// metrics.record_reload_success(timer, 2);
/// ```
#[derive(Clone)]
pub struct StoreMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    watch_lost: Counter<u64>,
    generation: Gauge<u64>,
    attributes: Vec<KeyValue>,
}

impl StoreMetrics {
    /// Create a metrics collector for the store backed by `path`.
    pub fn new(meter: Meter, path: impl Into<String>) -> Self {
        let reload_attempts = meter
            .u64_counter("credstore.reload.attempts")
            .with_description("Total number of reload attempts")
            .build();

        let reload_success = meter
            .u64_counter("credstore.reload.success")
            .with_description("Number of reloads that published a new snapshot")
            .build();

        let reload_failures = meter
            .u64_counter("credstore.reload.failures")
            .with_description("Number of abandoned reloads")
            .build();

        let reload_duration = meter
            .f64_histogram("credstore.reload.duration")
            .with_description("Duration of reload operations in seconds")
            .with_unit("s")
            .build();

        let watch_lost = meter
            .u64_counter("credstore.watch.lost")
            .with_description("Number of times the file watch was lost")
            .build();

        let generation = meter
            .u64_gauge("credstore.snapshot.generation")
            .with_description("Generation of the active snapshot")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_failures,
            reload_duration,
            watch_lost,
            generation,
            attributes: vec![KeyValue::new("path", path.into())],
        }
    }

    /// Start a reload timer.
    ///
    /// Pass the returned `Instant` to `record_reload_success` or
    /// `record_reload_failure` when the reload completes.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &self.attributes);
        Instant::now()
    }

    /// Record a reload that published snapshot `generation`.
    pub fn record_reload_success(&self, start: Instant, generation: u64) {
        self.reload_success.add(1, &self.attributes);
        self.reload_duration
            .record(start.elapsed().as_secs_f64(), &self.attributes);
        self.generation.record(generation, &self.attributes);
    }

    /// Record an abandoned reload.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &self.attributes);
        self.reload_duration
            .record(start.elapsed().as_secs_f64(), &self.attributes);
    }

    /// Record that the file watch was lost.
    pub fn record_watch_lost(&self) {
        self.watch_lost.add(1, &self.attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_creation() {
        let metrics = StoreMetrics::new(global::meter("test"), "/tmp/store.yaml");

        let timer = metrics.start_reload();
        metrics.record_reload_success(timer, 1);

        let timer = metrics.start_reload();
        metrics.record_reload_failure(timer);

        metrics.record_watch_lost();
    }

    #[test]
    fn test_metrics_clone() {
        let metrics = StoreMetrics::new(global::meter("test"), "/tmp/store.yaml");
        let metrics2 = metrics.clone();

        let timer1 = metrics.start_reload();
        let timer2 = metrics2.start_reload();

        metrics.record_reload_success(timer1, 1);
        metrics2.record_reload_success(timer2, 2);
    }
}
