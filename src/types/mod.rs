//! Type definitions for the prediction service

pub mod envelope;
pub mod record;

pub use envelope::{extract_record, Response};
pub use record::{display_value, FeatureValue, InputRecord, NumericValue};
