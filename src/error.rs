//! Error types for the prediction service
//!
//! Request-level errors map onto the response contract through
//! [`RequestError::status_code`]; side-effect errors (audit, metrics) are
//! never allowed to reach the caller.

use thiserror::Error;

/// Failure turning a raw record into the model's feature vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// A required feature key is absent from the payload
    #[error("Feature '{0}' missing from payload.")]
    MissingFeature(String),

    /// A feature value could not be read as a number
    #[error("Feature '{feature}' has non-numeric value {value}.")]
    Coercion { feature: String, value: String },
}

/// Failure unwrapping the transport envelope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("Request must be a JSON object.")]
    NotAnObject,

    #[error("Request body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("Request body must be a JSON string or object.")]
    UnsupportedBody,

    #[error("Field 'data' must be a JSON object.")]
    DataNotObject,
}

/// Failure running the predictive model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// The model rejected the input or failed while scoring
    #[error("Model inference failed: {0}")]
    Model(String),

    /// The model produced no score for the request
    #[error("Model returned no prediction.")]
    EmptyOutput,

    /// The model session can no longer be used (poisoned lock)
    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the audit object store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object changed (or appeared) since it was fetched
    #[error("precondition failed for object '{key}'")]
    PreconditionFailed { key: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors from the daily audit log appender.
#[derive(Debug, Error)]
pub enum AuditError {
    /// An existing day log was fetched but holds no lines
    #[error("audit log '{key}' exists but is empty")]
    CorruptLog { key: String },

    #[error("audit storage failure: {0}")]
    Storage(#[from] StoreError),

    /// Every conditional write attempt lost the race
    #[error("audit log '{key}' kept changing after {attempts} attempts")]
    AppendConflict { key: String, attempts: u32 },
}

/// Errors from the metrics sink boundary.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to encode metric: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("metrics sink unavailable: {0}")]
    Unavailable(String),
}

/// Any failure that ends a request without a prediction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Fault outside the request's control
    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// HTTP-style status code for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::Inference(InferenceError::Unavailable(_)) | RequestError::Internal(_) => 500,
            _ => 400,
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        if self.status_code() >= 500 {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}
