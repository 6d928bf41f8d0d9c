//! Feature normalization for credit score model inference.
//!
//! Turns a loosely-typed applicant record into the numeric vector the model
//! was trained on. The feature order must match the training pipeline;
//! nothing at runtime can detect a reordering beyond key presence.

use crate::error::NormalizeError;
use crate::types::record::{FeatureValue, InputRecord, NumericValue};
use std::collections::HashSet;
use thiserror::Error;

/// Ordered numeric model input, one entry per feature.
pub type NumericVector = Vec<NumericValue>;

/// Feature order of the reference credit score model.
pub const REFERENCE_FEATURES: [&str; 18] = [
    "Age",
    "Annual_Income",
    "Num_Bank_Accounts",
    "Num_Credit_Card",
    "Num_of_Delayed_Payment",
    "Credit_Utilization_Ratio",
    "Payment_of_Min_Amount",
    "Total_EMI_per_month",
    "Credit_History_Age_Formated",
    "Auto_Loan",
    "Credit-Builder_Loan",
    "Personal_Loan",
    "Home_Equity_Loan",
    "Mortgage_Loan",
    "Student_Loan",
    "Debt_Consolidation_Loan",
    "Payday_Loan",
    "Missed_Payment_Day",
];

/// Invalid feature order configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureSpecError {
    #[error("feature order is empty")]
    Empty,
    #[error("feature '{0}' listed more than once")]
    Duplicate(String),
}

/// Fixed, ordered list of feature names the model expects.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    names: Vec<String>,
}

impl FeatureSpec {
    /// Create a feature spec from an explicit order.
    pub fn new<I, S>(names: I) -> Result<Self, FeatureSpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(FeatureSpecError::Empty);
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(FeatureSpecError::Duplicate(name.clone()));
            }
        }

        Ok(Self { names })
    }

    /// The 18-feature order of the reference deployment.
    pub fn reference() -> Self {
        Self {
            names: REFERENCE_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.names.len()
    }

    /// Get feature names in model order.
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Normalize a record into model order.
    ///
    /// Fails on the first feature (in model order) that is absent or cannot
    /// be read as a number. Extra record keys are ignored.
    pub fn normalize(&self, record: &InputRecord) -> Result<NumericVector, NormalizeError> {
        let mut features = Vec::with_capacity(self.names.len());

        for name in &self.names {
            let raw = record
                .get(name)
                .ok_or_else(|| NormalizeError::MissingFeature(name.clone()))?;
            let value = FeatureValue::from_json(name, raw)?;
            features.push(value.coerce(name)?);
        }

        Ok(features)
    }
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self::reference()
    }
}

/// Normalize `record` against `spec`.
pub fn normalize(record: &InputRecord, spec: &FeatureSpec) -> Result<NumericVector, NormalizeError> {
    spec.normalize(record)
}

/// Narrow a numeric vector to the model's `f32` input.
pub fn to_model_input(vector: &[NumericValue]) -> Vec<f32> {
    vector.iter().map(NumericValue::as_f32).collect()
}
