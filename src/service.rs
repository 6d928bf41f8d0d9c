//! Prediction request orchestration
//!
//! A request moves through extract -> normalize -> infer, and any failure
//! there becomes an error response. Once a prediction exists, metrics and
//! the audit log each run in their own failure boundary: their errors are
//! logged and counted but never change the response.

use crate::audit::{AuditLogAppender, AuditRecord, ObjectStore};
use crate::config::AppConfig;
use crate::emitter::{MetricsEmitter, MetricsSink};
use crate::error::RequestError;
use crate::feature_normalizer::{to_model_input, FeatureSpec, FeatureSpecError};
use crate::metrics::{PipelineMetrics, SideEffect};
use crate::models::{predict_one, ModelMetadata, ScoreModel};
use crate::types::envelope::{extract_record, Response};
use crate::types::record::InputRecord;
use chrono::{Local, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Immutable request-handling context, built once at start-up.
pub struct PredictionService {
    spec: FeatureSpec,
    model: Arc<dyn ScoreModel>,
    metadata: ModelMetadata,
    emitter: MetricsEmitter,
    appender: AuditLogAppender,
    metrics: Arc<PipelineMetrics>,
}

impl PredictionService {
    pub fn new(
        spec: FeatureSpec,
        model: Arc<dyn ScoreModel>,
        metadata: ModelMetadata,
        emitter: MetricsEmitter,
        appender: AuditLogAppender,
    ) -> Self {
        Self {
            spec,
            model,
            metadata,
            emitter,
            appender,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Assemble the service from configuration and already-loaded collaborators
    pub fn from_config(
        config: &AppConfig,
        model: Arc<dyn ScoreModel>,
        metadata: ModelMetadata,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, FeatureSpecError> {
        let spec = FeatureSpec::new(config.features.order.iter().cloned())?;
        let emitter = MetricsEmitter::from_config(sink, &config.metrics, &spec);
        let appender = AuditLogAppender::from_config(store, &config.audit);
        Ok(Self::new(spec, model, metadata, emitter, appender))
    }

    /// Share an existing counter set (e.g. with a reporter task)
    pub fn with_pipeline_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn feature_spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn pipeline_metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Handle one request envelope using the local clock.
    pub fn handle(&self, event: &Value) -> Response {
        self.handle_at(event, Local::now().naive_local())
    }

    /// Handle one request envelope as if received at local time `now`.
    pub fn handle_at(&self, event: &Value, now: NaiveDateTime) -> Response {
        let start = Instant::now();
        debug!(event = %event, "Received event");

        match self.predict(event) {
            Ok((record, prediction)) => {
                self.record_side_effects(&record, prediction, now);
                self.metrics.record_prediction(start.elapsed(), prediction);

                info!(
                    prediction = prediction,
                    version = %self.metadata.version,
                    processing_time_us = start.elapsed().as_micros(),
                    "Prediction served"
                );
                Response::success(prediction, &self.metadata.version)
            }
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    error!(error = %e, status = status, "Error during prediction");
                } else {
                    warn!(error = %e, status = status, "Request rejected");
                }
                self.metrics.record_failure(start.elapsed(), status);
                Response::failure(&e)
            }
        }
    }

    /// Extract, normalize and score a request.
    pub fn predict(&self, event: &Value) -> Result<(InputRecord, f64), RequestError> {
        let record = extract_record(event)?;
        let features = self.spec.normalize(&record)?;
        let prediction = predict_one(self.model.as_ref(), to_model_input(&features))?;

        debug!(model = %self.model.name(), prediction = prediction, "Inference complete");
        Ok((record, prediction))
    }

    /// Metrics first, then the audit log; each failure is isolated.
    fn record_side_effects(&self, record: &InputRecord, prediction: f64, now: NaiveDateTime) {
        if let Err(e) = self.emitter.emit_record(record, prediction) {
            warn!(error = %e, "Failed to emit prediction metrics");
            self.metrics.record_side_effect_failure(SideEffect::Metrics);
        }

        let audit = AuditRecord::new(record, prediction, now, &self.metadata.version);
        match self.appender.append(now.date(), &audit) {
            Ok(outcome) => debug!(
                key = %outcome.key,
                rows = outcome.rows,
                attempts = outcome.attempts,
                created = outcome.created,
                "Audit record appended"
            ),
            Err(e) => {
                error!(error = %e, "Failed to append audit record");
                self.metrics.record_side_effect_failure(SideEffect::Audit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryObjectStore, Precondition, StoredObject};
    use crate::config::CorruptLogPolicy;
    use crate::emitter::{MemoryMetricsSink, MetricDatum};
    use crate::error::{InferenceError, MetricsError, StoreError};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    /// Linear stand-in for the trained model
    struct LinearModel;

    impl ScoreModel for LinearModel {
        fn name(&self) -> &str {
            "linear"
        }

        fn predict(&self, batch: &[Vec<f32>]) -> Result<Vec<f64>, InferenceError> {
            Ok(batch
                .iter()
                .map(|row| 300.0 + row.iter().map(|&v| v as f64).sum::<f64>() / 100.0)
                .collect())
        }
    }

    struct FailingModel(InferenceError);

    impl ScoreModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict(&self, _batch: &[Vec<f32>]) -> Result<Vec<f64>, InferenceError> {
            Err(self.0.clone())
        }
    }

    struct FailingSink;

    impl MetricsSink for FailingSink {
        fn put_metric(&self, _namespace: &str, _datum: MetricDatum) -> Result<(), MetricsError> {
            Err(MetricsError::Unavailable("backend down".to_string()))
        }
    }

    struct FailingStore;

    impl ObjectStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<StoredObject>, StoreError> {
            Err(StoreError::Backend("access denied".to_string()))
        }

        fn put(&self, _key: &str, _body: &str) -> Result<String, StoreError> {
            Err(StoreError::Backend("access denied".to_string()))
        }

        fn put_if(&self, key: &str, body: &str, _p: &Precondition) -> Result<String, StoreError> {
            self.put(key, body)
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap()
    }

    fn payload() -> Value {
        json!({
            "Age": 30,
            "Annual_Income": 43391.96,
            "Num_Bank_Accounts": 1,
            "Num_Credit_Card": 5,
            "Num_of_Delayed_Payment": 6,
            "Credit_Utilization_Ratio": 29.112467941684688,
            "Payment_of_Min_Amount": 0,
            "Total_EMI_per_month": 0.0,
            "Credit_History_Age_Formated": 284,
            "Auto_Loan": 0,
            "Credit-Builder_Loan": 0,
            "Personal_Loan": 0,
            "Home_Equity_Loan": 0,
            "Mortgage_Loan": 0,
            "Student_Loan": 0,
            "Debt_Consolidation_Loan": 0,
            "Payday_Loan": 0,
            "Missed_Payment_Day": 1
        })
    }

    fn service_with(
        model: Arc<dyn ScoreModel>,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn MetricsSink>,
    ) -> PredictionService {
        PredictionService::from_config(
            &AppConfig::default(),
            model,
            ModelMetadata::new("2025.06.01"),
            store,
            sink,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_request_returns_prediction() {
        let store = Arc::new(MemoryObjectStore::new());
        let sink = Arc::new(MemoryMetricsSink::new());
        let service = service_with(Arc::new(LinearModel), store.clone(), sink.clone());

        let response = service.handle_at(&json!({ "data": payload() }), now());
        assert_eq!(response.status_code, 200);

        let body = response.body_json().unwrap();
        assert!(body["prediction"].is_f64());
        assert!(body["prediction"].as_f64().unwrap() > 0.0);
        assert_eq!(body["version"], "2025.06.01");

        // prediction + one observation per feature
        assert_eq!(sink.data().len(), 19);

        let log = store
            .get("credit-score-real-data/2025-06-01_credit_score_prediction_data.csv")
            .unwrap()
            .unwrap();
        let lines: Vec<&str> = log.body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Age,Annual_Income,"));
        assert!(lines[0].ends_with(",credit_score_prediction,timestamp,model_version"));
        assert!(lines[1].starts_with("30,43391.96,"));
        assert!(lines[1].ends_with(",01-06-2025 10:15,2025.06.01"));
    }

    #[test]
    fn test_empty_record_is_rejected() {
        let store = Arc::new(MemoryObjectStore::new());
        let sink = Arc::new(MemoryMetricsSink::new());
        let service = service_with(Arc::new(LinearModel), store.clone(), sink.clone());

        let response = service.handle_at(&json!({ "data": {} }), now());
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.body_json().unwrap(),
            json!({"error": "Feature 'Age' missing from payload."})
        );

        // No side effects without a prediction
        assert!(sink.data().is_empty());
        assert!(store
            .get("credit-score-real-data/2025-06-01_credit_score_prediction_data.csv")
            .unwrap()
            .is_none());
        assert_eq!(service.pipeline_metrics().rejections.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_gateway_request() {
        let service = service_with(
            Arc::new(LinearModel),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryMetricsSink::new()),
        );

        let body = json!({ "data": payload() }).to_string();
        let response = service.handle_at(&json!({ "body": body }), now());
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_string_values_are_accepted() {
        let service = service_with(
            Arc::new(LinearModel),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryMetricsSink::new()),
        );

        let mut data = payload();
        data["Age"] = json!("30");
        data["Annual_Income"] = json!("43391.96");
        let response = service.handle_at(&json!({ "data": data }), now());
        assert_eq!(response.status_code, 200);

        data["Age"] = json!("thirty");
        let response = service.handle_at(&json!({ "data": data }), now());
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.body_json().unwrap()["error"],
            "Feature 'Age' has non-numeric value \"thirty\"."
        );
    }

    #[test]
    fn test_model_error_is_client_error() {
        let service = service_with(
            Arc::new(FailingModel(InferenceError::Model("bad shape".to_string()))),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryMetricsSink::new()),
        );

        let response = service.handle_at(&json!({ "data": payload() }), now());
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.body_json().unwrap()["error"],
            "Model inference failed: bad shape"
        );
    }

    #[test]
    fn test_internal_fault_hides_details() {
        let service = service_with(
            Arc::new(FailingModel(InferenceError::Unavailable(
                "poisoned lock".to_string(),
            ))),
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryMetricsSink::new()),
        );

        let response = service.handle_at(&json!({ "data": payload() }), now());
        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.body_json().unwrap(),
            json!({"error": "Internal server error"})
        );
        assert_eq!(
            service.pipeline_metrics().internal_errors.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_side_effect_failures_keep_prediction() {
        let service = service_with(
            Arc::new(LinearModel),
            Arc::new(FailingStore),
            Arc::new(FailingSink),
        );

        let response = service.handle_at(&json!({ "data": payload() }), now());
        assert_eq!(response.status_code, 200);

        let metrics = service.pipeline_metrics();
        assert_eq!(metrics.metrics_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.audit_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.predictions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_corrupt_log_does_not_fail_request() {
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put("credit-score-real-data/2025-06-01_credit_score_prediction_data.csv", "")
            .unwrap();

        let mut config = AppConfig::default();
        config.audit.corrupt_log_policy = CorruptLogPolicy::Fail;
        let service = PredictionService::from_config(
            &config,
            Arc::new(LinearModel),
            ModelMetadata::new("v1"),
            store.clone(),
            Arc::new(MemoryMetricsSink::new()),
        )
        .unwrap();

        let response = service.handle_at(&json!({ "data": payload() }), now());
        assert_eq!(response.status_code, 200);
        assert_eq!(
            service.pipeline_metrics().audit_failures.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_extra_keys_reach_audit_only() {
        let store = Arc::new(MemoryObjectStore::new());
        let sink = Arc::new(MemoryMetricsSink::new());
        let service = service_with(Arc::new(LinearModel), store.clone(), sink.clone());

        let mut data = payload();
        data["applicant_ref"] = json!("A-17");
        let response = service.handle_at(&json!({ "data": data }), now());
        assert_eq!(response.status_code, 200);

        // Extra key is not a feature metric
        assert!(sink.data().iter().all(|(_, d)| d.metric_name != "applicant_ref"));

        let log = store
            .get("credit-score-real-data/2025-06-01_credit_score_prediction_data.csv")
            .unwrap()
            .unwrap();
        assert!(log.body.lines().next().unwrap().contains(",applicant_ref,"));
        assert!(log.body.contains(",A-17,"));
    }
}
