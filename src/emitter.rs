//! Prediction metrics emitted to an external metrics backend.
//!
//! The backend is a push-style sink; nothing it returns is consumed beyond
//! success or failure.

use crate::config::MetricsConfig;
use crate::error::MetricsError;
use crate::feature_normalizer::FeatureSpec;
use crate::types::record::{display_value, InputRecord};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Name of the prediction metric
pub const PREDICTION_METRIC: &str = "CreditScorePrediction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricUnit {
    None,
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// One metric data point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    pub metric_name: String,
    pub value: f64,
    pub unit: MetricUnit,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<Dimension>,
}

/// Push-style metrics backend
pub trait MetricsSink: Send + Sync {
    fn put_metric(&self, namespace: &str, datum: MetricDatum) -> Result<(), MetricsError>;
}

/// Writes every datum as a structured tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn put_metric(&self, namespace: &str, datum: MetricDatum) -> Result<(), MetricsError> {
        let dimensions = serde_json::to_string(&datum.dimensions)?;
        info!(
            namespace = %namespace,
            metric = %datum.metric_name,
            value = datum.value,
            unit = ?datum.unit,
            dimensions = %dimensions,
            "metric"
        );
        Ok(())
    }
}

/// Keeps every datum in memory
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    data: Mutex<Vec<(String, MetricDatum)>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(namespace, datum)` pairs in emission order
    pub fn data(&self) -> Vec<(String, MetricDatum)> {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn put_metric(&self, namespace: &str, datum: MetricDatum) -> Result<(), MetricsError> {
        self.data
            .lock()
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?
            .push((namespace.to_string(), datum));
        Ok(())
    }
}

/// Counts from one record's emission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitSummary {
    pub observations: usize,
    /// Keys left out by the allow-list
    pub skipped: usize,
}

/// Turns predictions and feature values into metric data.
///
/// Only keys in the allow-list (the model's feature names) produce
/// per-value observations, so callers cannot grow the metric cardinality by
/// adding keys.
pub struct MetricsEmitter {
    sink: Arc<dyn MetricsSink>,
    model_namespace: String,
    features_namespace: String,
    allowed_features: HashSet<String>,
    emit_features: bool,
    max_dimension_len: usize,
}

impl MetricsEmitter {
    pub fn new(sink: Arc<dyn MetricsSink>, spec: &FeatureSpec) -> Self {
        Self::from_config(sink, &MetricsConfig::default(), spec)
    }

    pub fn from_config(sink: Arc<dyn MetricsSink>, config: &MetricsConfig, spec: &FeatureSpec) -> Self {
        Self {
            sink,
            model_namespace: config.model_namespace.clone(),
            features_namespace: config.features_namespace.clone(),
            allowed_features: spec.feature_names().iter().cloned().collect(),
            emit_features: config.emit_features,
            max_dimension_len: config.max_dimension_len,
        }
    }

    /// Emit the prediction value
    pub fn emit_prediction(&self, value: f64) -> Result<(), MetricsError> {
        self.sink.put_metric(
            &self.model_namespace,
            MetricDatum {
                metric_name: PREDICTION_METRIC.to_string(),
                value,
                unit: MetricUnit::None,
                dimensions: Vec::new(),
            },
        )
    }

    /// Count one observed value of a feature
    pub fn emit_feature_observation(&self, name: &str, value: &Value) -> Result<(), MetricsError> {
        let value: String = display_value(value)
            .chars()
            .take(self.max_dimension_len)
            .collect();

        self.sink.put_metric(
            &self.features_namespace,
            MetricDatum {
                metric_name: name.to_string(),
                value: 1.0,
                unit: MetricUnit::Count,
                dimensions: vec![Dimension {
                    name: "Value".to_string(),
                    value,
                }],
            },
        )
    }

    /// Emit the prediction, then one observation per allowed record key.
    pub fn emit_record(&self, record: &InputRecord, prediction: f64) -> Result<EmitSummary, MetricsError> {
        self.emit_prediction(prediction)?;

        let mut summary = EmitSummary::default();
        if !self.emit_features {
            return Ok(summary);
        }

        for (name, value) in record.iter() {
            if self.allowed_features.contains(name) {
                self.emit_feature_observation(name, value)?;
                summary.observations += 1;
            } else {
                summary.skipped += 1;
            }
        }

        if summary.skipped > 0 {
            debug!(skipped = summary.skipped, "Record keys outside the feature list were not emitted");
        }

        Ok(summary)
    }
}
