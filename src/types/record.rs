//! Applicant records and feature values

use crate::error::NormalizeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Caller-supplied mapping of feature name to raw value for one request.
///
/// Keys keep the order in which the caller sent them; that order drives the
/// audit log column layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputRecord(Map<String, Value>);

impl InputRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Look up the raw value of a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Set a field; an existing key keeps its position
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Iterate fields in record order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for InputRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A raw feature value, classified once at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FeatureValue {
    /// Classify a raw JSON value.
    ///
    /// Booleans count as integers (0/1). Null, arrays and objects are not
    /// feature values.
    pub fn from_json(feature: &str, value: &Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Number(n) => Ok(Self::from_number(n)),
            Value::String(s) => Ok(FeatureValue::Text(s.clone())),
            Value::Bool(b) => Ok(FeatureValue::Integer(i64::from(*b))),
            other => Err(NormalizeError::Coercion {
                feature: feature.to_string(),
                value: other.to_string(),
            }),
        }
    }

    fn from_number(n: &Number) -> Self {
        match n.as_i64() {
            Some(i) => FeatureValue::Integer(i),
            None => FeatureValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        }
    }

    /// Coerce into a model-ready number.
    ///
    /// Text containing a '.' parses as a float, any other text as an integer.
    /// "1e5" is therefore rejected and "30.0" becomes a float.
    pub fn coerce(&self, feature: &str) -> Result<NumericValue, NormalizeError> {
        match self {
            FeatureValue::Integer(i) => Ok(NumericValue::Integer(*i)),
            FeatureValue::Float(f) => Ok(NumericValue::Float(*f)),
            FeatureValue::Text(text) => {
                let trimmed = text.trim();
                let parsed = if trimmed.contains('.') {
                    trimmed.parse::<f64>().ok().map(NumericValue::Float)
                } else {
                    trimmed.parse::<i64>().ok().map(NumericValue::Integer)
                };
                parsed.ok_or_else(|| NormalizeError::Coercion {
                    feature: feature.to_string(),
                    value: Value::String(text.clone()).to_string(),
                })
            }
        }
    }
}

/// One entry of the model's input vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Integer(i64),
    Float(f64),
}

impl NumericValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            NumericValue::Integer(i) => *i as f64,
            NumericValue::Float(f) => *f,
        }
    }

    /// Narrow for the ONNX input tensor
    pub fn as_f32(&self) -> f32 {
        self.as_f64() as f32
    }
}

/// Render a raw value as a log cell or metric dimension.
///
/// Strings are written verbatim, numbers in their JSON form (so `0.0` keeps
/// its fractional part), null as an empty cell.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
