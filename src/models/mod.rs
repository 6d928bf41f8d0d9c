//! ML model loading and inference

pub mod inference;
pub mod loader;

pub use inference::{predict_one, OnnxScoreModel, ScoreModel};
pub use loader::{LoadedModel, ModelLoader, ModelMetadata};
