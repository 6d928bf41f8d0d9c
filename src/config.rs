//! Configuration management for the credit score service

use crate::feature_normalizer::REFERENCE_FEATURES;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// How a daily audit log is rewritten
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppendStrategy {
    /// Fetch then overwrite unconditionally; concurrent appends can lose rows
    Overwrite,
    /// Write only if the log is unchanged since the fetch, retrying on conflict
    #[default]
    Conditional,
}

/// What to do with a day log that exists but holds no lines
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorruptLogPolicy {
    #[default]
    Fail,
    StartFresh,
}

/// Audit object store backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Memory,
}

/// Where metric datums are pushed
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSinkKind {
    /// Structured tracing events
    #[default]
    Log,
    /// JSON messages on a NATS subject
    Nats,
    Memory,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub model: ModelConfig,
    pub features: FeaturesConfig,
    pub audit: AuditConfig,
    pub metrics: MetricsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming prediction requests
    pub request_subject: String,
    /// Queue group shared by service replicas
    pub queue_group: String,
    /// Subject for metric datums when the NATS sink is used
    pub metrics_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            request_subject: "credit_score.predict".to_string(),
            queue_group: "credit-score-service".to_string(),
            metrics_subject: "credit_score.metrics".to_string(),
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX model file
    pub model_path: PathBuf,
    /// JSON metadata file with at least a `version` field
    pub metadata_path: PathBuf,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/model.onnx"),
            metadata_path: PathBuf::from("model/model_metadata.json"),
            onnx_threads: 1,
        }
    }
}

/// Feature order configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Feature names in the order the model was trained on
    pub order: Vec<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            order: REFERENCE_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub backend: StorageBackend,
    /// Root directory of the filesystem backend
    pub root_dir: PathBuf,
    /// Key prefix of the daily log objects
    pub prefix: String,
    pub strategy: AppendStrategy,
    /// Fetch/write cycles before a conditional append gives up
    pub max_attempts: u32,
    pub corrupt_log_policy: CorruptLogPolicy,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            root_dir: PathBuf::from("data"),
            prefix: "credit-score-real-data".to_string(),
            strategy: AppendStrategy::Conditional,
            max_attempts: 5,
            corrupt_log_policy: CorruptLogPolicy::Fail,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub sink: MetricsSinkKind,
    /// Namespace of the prediction metric
    pub model_namespace: String,
    /// Namespace of the per-feature observation metrics
    pub features_namespace: String,
    /// Emit one observation per feature value
    pub emit_features: bool,
    /// Dimension values are truncated to this many characters
    pub max_dimension_len: usize,
    /// Seconds between pipeline summaries (0 disables the reporter)
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sink: MetricsSinkKind::Log,
            model_namespace: "CreditScoreModel".to_string(),
            features_namespace: "CreditScoreFeatures".to_string(),
            emit_features: true,
            max_dimension_len: 64,
            report_interval_secs: 60,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of requests handled concurrently
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path.
    ///
    /// Environment variables prefixed with `CREDIT_SCORE__` override file
    /// values, e.g. `CREDIT_SCORE__NATS__URL`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("CREDIT_SCORE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.features.order.len(), 18);
        assert_eq!(config.audit.strategy, AppendStrategy::Conditional);
        assert_eq!(config.audit.corrupt_log_policy, CorruptLogPolicy::Fail);
        assert_eq!(config.metrics.model_namespace, "CreditScoreModel");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[audit]
strategy = "overwrite"
corrupt_log_policy = "start_fresh"

[pipeline]
workers = 8
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.audit.strategy, AppendStrategy::Overwrite);
        assert_eq!(config.audit.corrupt_log_policy, CorruptLogPolicy::StartFresh);
        assert_eq!(config.audit.prefix, "credit-score-real-data");
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.metrics.sink, MetricsSinkKind::Log);
    }
}
