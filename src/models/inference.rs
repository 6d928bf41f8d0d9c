//! Credit score inference boundary

use crate::error::InferenceError;
use crate::models::loader::LoadedModel;
use ort::value::{DynValue, Tensor};
use std::sync::RwLock;
use tracing::debug;

/// Opaque predictive model: ordered numeric vectors in, one score per vector out.
pub trait ScoreModel: Send + Sync {
    /// Model name used in logs
    fn name(&self) -> &str;

    /// Score a batch of feature vectors
    fn predict(&self, batch: &[Vec<f32>]) -> Result<Vec<f64>, InferenceError>;
}

/// Score a single vector and take the first output as the prediction.
pub fn predict_one(model: &dyn ScoreModel, features: Vec<f32>) -> Result<f64, InferenceError> {
    model
        .predict(&[features])?
        .first()
        .copied()
        .ok_or(InferenceError::EmptyOutput)
}

/// Score model backed by an ONNX Runtime session
pub struct OnnxScoreModel {
    name: String,
    /// Session runs need exclusive access
    model: RwLock<LoadedModel>,
}

impl OnnxScoreModel {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            name: model.name.clone(),
            model: RwLock::new(model),
        }
    }
}

impl ScoreModel for OnnxScoreModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, batch: &[Vec<f32>]) -> Result<Vec<f64>, InferenceError> {
        let rows = batch.len();
        if rows == 0 {
            return Ok(Vec::new());
        }

        let width = batch[0].len();
        if batch.iter().any(|row| row.len() != width) {
            return Err(InferenceError::Model(
                "feature vectors in a batch must have the same length".to_string(),
            ));
        }

        // Prepare input tensor - shape [rows, num_features]
        let data: Vec<f32> = batch.iter().flatten().copied().collect();
        let shape = vec![rows as i64, width as i64];
        let input_tensor = Tensor::from_array((shape, data))
            .map_err(|e| InferenceError::Model(format!("failed to create input tensor: {e}")))?;

        let mut model = self
            .model
            .write()
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;
        let input_name = model.input_name.clone();
        let output_name = model.output_name.clone();

        let outputs = model
            .session
            .run(ort::inputs![input_name.as_str() => input_tensor])
            .map_err(|e| InferenceError::Model(e.to_string()))?;

        if let Some(output) = outputs.get(output_name.as_str()) {
            if let Some(scores) = scores_from_output(output, rows) {
                debug!(model = %self.name, rows = rows, "Extracted scores from named output");
                return Ok(scores);
            }
        }

        // Fallback: first output that holds a numeric tensor
        for (name, output) in outputs.iter() {
            if let Some(scores) = scores_from_output(&output, rows) {
                debug!(model = %self.name, output = %name, "Extracted scores (fallback)");
                return Ok(scores);
            }
        }

        Err(InferenceError::Model(format!(
            "model '{}' produced no numeric output",
            self.name
        )))
    }
}

/// Read one score per row from a numeric output tensor.
fn scores_from_output(output: &DynValue, rows: usize) -> Option<Vec<f64>> {
    if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
        return Some(first_column(data.iter().map(|&v| v as f64).collect(), rows));
    }
    if let Ok((_, data)) = output.try_extract_tensor::<f64>() {
        return Some(first_column(data.to_vec(), rows));
    }
    if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
        return Some(first_column(data.iter().map(|&v| v as f64).collect(), rows));
    }
    None
}

/// Keep the first value of each row of a row-major `[rows, k]` buffer.
fn first_column(values: Vec<f64>, rows: usize) -> Vec<f64> {
    if rows == 0 || values.is_empty() {
        return values;
    }
    let stride = (values.len() / rows).max(1);
    values.into_iter().step_by(stride).take(rows).collect()
}
