//! The seam between the removal pipeline and a segmentation engine

use crate::{
    config::RemovalConfig,
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;

/// A segmentation engine that turns a normalized NCHW tensor into a mask tensor
///
/// Engines run on a blocking worker thread, hence `Send`.
pub trait InferenceBackend: Send {
    /// Load the model described by `config`
    ///
    /// Returns how long loading took, or `None` when the engine was
    /// already loaded by an earlier call.
    ///
    /// # Errors
    /// - The model cannot be read or is not a valid segmentation model
    /// - The requested execution provider cannot be set up
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Produce a `[1, 1, H, W]` mask tensor for `input`
    ///
    /// # Errors
    /// Fails when called before [`InferenceBackend::initialize`] or when the
    /// engine rejects the tensor.
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Normalization and input size the loaded model expects
    fn preprocessing_config(&self) -> PreprocessingConfig;

    fn model_info(&self) -> ModelInfo;

    fn is_initialized(&self) -> bool;
}
