//! Credit Score Prediction Service Library
//!
//! Normalizes applicant records into the model's feature order, scores them
//! with an ONNX model, emits prediction metrics and appends every prediction
//! to a per-day audit log.

pub mod audit;
pub mod config;
pub mod consumer;
pub mod emitter;
pub mod error;
pub mod feature_normalizer;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod service;
pub mod types;

pub use audit::{AuditLogAppender, AuditRecord, DailyLog};
pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use emitter::MetricsEmitter;
pub use feature_normalizer::{normalize, FeatureSpec, NumericVector};
pub use models::{OnnxScoreModel, ScoreModel};
pub use producer::ResponsePublisher;
pub use service::PredictionService;
pub use types::{InputRecord, Response};
