//! Audit records and the per-day CSV log format

use crate::error::AuditError;
use crate::types::record::{display_value, InputRecord};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Suffix of every daily log object name
pub const LOG_FILE_SUFFIX: &str = "_credit_score_prediction_data.csv";

/// Local wall-clock format of the `timestamp` column
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Object key of the log for `date`: `<prefix>/<YYYY-MM-DD>_credit_score_prediction_data.csv`
pub fn daily_log_key(prefix: &str, date: NaiveDate) -> String {
    let file_name = format!("{}{}", date.format("%Y-%m-%d"), LOG_FILE_SUFFIX);
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        file_name
    } else {
        format!("{prefix}/{file_name}")
    }
}

/// Input record enriched with the prediction, the local timestamp and the
/// model version.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    fields: InputRecord,
}

impl AuditRecord {
    pub fn new(
        input: &InputRecord,
        prediction: f64,
        timestamp: NaiveDateTime,
        model_version: &str,
    ) -> Self {
        let mut fields = input.clone();
        // Derived fields overwrite colliding input keys in place
        fields.insert("credit_score_prediction", Value::from(prediction));
        fields.insert(
            "timestamp",
            timestamp.format(TIMESTAMP_FORMAT).to_string(),
        );
        fields.insert("model_version", model_version);
        Self { fields }
    }

    pub fn fields(&self) -> &InputRecord {
        &self.fields
    }

    /// Comma-joined field names, in record order
    pub fn header(&self) -> String {
        self.fields
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Comma-joined field values, in record order.
    ///
    /// Values are not quoted; a value containing a comma shifts the columns
    /// of its row.
    pub fn row(&self) -> String {
        self.fields
            .iter()
            .map(|(_, value)| display_value(value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One day's audit table: a header line and zero or more data rows.
///
/// Rows are appended positionally; a record whose keys differ from the
/// header's will not line up with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyLog {
    header: String,
    rows: Vec<String>,
}

impl DailyLog {
    /// Start a log whose header is taken from `record`
    pub fn create(record: &AuditRecord) -> Self {
        Self {
            header: record.header(),
            rows: Vec::new(),
        }
    }

    /// Split fetched content into header and rows.
    ///
    /// Content without any line cannot carry a header and is reported as
    /// corrupt.
    pub fn parse(key: &str, content: &str) -> Result<Self, AuditError> {
        let mut lines = content.lines();
        let header = lines.next().ok_or_else(|| AuditError::CorruptLog {
            key: key.to_string(),
        })?;

        Ok(Self {
            header: header.to_string(),
            rows: lines.map(str::to_string).collect(),
        })
    }

    pub fn push(&mut self, record: &AuditRecord) {
        self.rows.push(record.row());
    }

    /// Header and rows joined by newlines, without a trailing newline
    pub fn render(&self) -> String {
        let mut content = self.header.clone();
        for row in &self.rows {
            content.push('\n');
            content.push_str(row);
        }
        content
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }
}
