//! Request envelopes and the response contract

use crate::error::{ExtractError, RequestError};
use crate::types::record::InputRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Pull the applicant record out of a request envelope.
///
/// Two shapes are accepted:
/// - gateway: `{"body": "<json string containing {\"data\": {...}}>"}`
/// - direct: `{"data": {...}}`
///
/// A missing `data` field yields an empty record; the record content itself
/// is not validated here.
pub fn extract_record(event: &Value) -> Result<InputRecord, ExtractError> {
    let event = event.as_object().ok_or(ExtractError::NotAnObject)?;

    let data = match event.get("body") {
        Some(body) => {
            let body = match body {
                Value::String(raw) => serde_json::from_str::<Value>(raw)
                    .map_err(|e| ExtractError::InvalidBody(e.to_string()))?,
                Value::Object(_) => body.clone(),
                _ => return Err(ExtractError::UnsupportedBody),
            };
            match body {
                Value::Object(mut fields) => fields.remove("data"),
                _ => return Err(ExtractError::UnsupportedBody),
            }
        }
        None => event.get("data").cloned(),
    };

    match data {
        None => Ok(InputRecord::new()),
        Some(Value::Object(fields)) => Ok(InputRecord::from(fields)),
        Some(_) => Err(ExtractError::DataNotObject),
    }
}

/// Response object returned for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded body
    pub body: String,
}

impl Response {
    fn json(status_code: u16, body: Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    /// 200 with `{"prediction", "version"}`
    pub fn success(prediction: f64, version: &str) -> Self {
        Self::json(200, json!({ "prediction": prediction, "version": version }))
    }

    /// 4xx/5xx with `{"error"}`; internal faults get a generic message
    pub fn failure(error: &RequestError) -> Self {
        Self::json(error.status_code(), json!({ "error": error.public_message() }))
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Decode the JSON body
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}
