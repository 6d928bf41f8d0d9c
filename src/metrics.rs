//! In-process request statistics for the prediction service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Side effect that runs after a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Metrics,
    Audit,
}

/// Request counters and latency samples
pub struct PipelineMetrics {
    /// Requests answered with a prediction
    pub predictions: AtomicU64,
    /// Requests answered with a 4xx
    pub rejections: AtomicU64,
    /// Requests answered with a 5xx
    pub internal_errors: AtomicU64,
    /// Metric emissions that failed
    pub metrics_failures: AtomicU64,
    /// Audit appends that failed
    pub audit_failures: AtomicU64,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Running prediction summary
    predictions_summary: RwLock<PredictionStats>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            metrics_failures: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            predictions_summary: RwLock::new(PredictionStats::default()),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, processing_time: Duration, prediction: f64) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut summary) = self.predictions_summary.write() {
            summary.add(prediction);
        }
    }

    /// Record a request that ended without a prediction
    pub fn record_failure(&self, processing_time: Duration, status_code: u16) {
        if status_code >= 500 {
            self.internal_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
        self.record_time(processing_time);
    }

    pub fn record_side_effect_failure(&self, effect: SideEffect) {
        let counter = match effect {
            SideEffect::Metrics => &self.metrics_failures,
            SideEffect::Audit => &self.audit_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Total requests seen
    pub fn requests(&self) -> u64 {
        self.predictions.load(Ordering::Relaxed)
            + self.rejections.load(Ordering::Relaxed)
            + self.internal_errors.load(Ordering::Relaxed)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    pub fn get_prediction_stats(&self) -> PredictionStats {
        self.predictions_summary
            .read()
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let processing = self.get_processing_stats();
        let predictions = self.get_prediction_stats();

        info!(
            requests = self.requests(),
            predictions = self.predictions.load(Ordering::Relaxed),
            rejections = self.rejections.load(Ordering::Relaxed),
            internal_errors = self.internal_errors.load(Ordering::Relaxed),
            throughput = format!("{:.1} req/s", self.get_throughput()),
            "Request summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );
        if predictions.count > 0 {
            info!(
                mean = predictions.mean(),
                min = predictions.min,
                max = predictions.max,
                "Prediction distribution"
            );
        }
        info!(
            metrics_failures = self.metrics_failures.load(Ordering::Relaxed),
            audit_failures = self.audit_failures.load(Ordering::Relaxed),
            "Side-effect failures"
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Running min/max/mean of predictions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PredictionStats {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl PredictionStats {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Periodic summary printer
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
