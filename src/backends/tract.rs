//! Segmentation with tract, on the CPU and without native libraries
//!
//! Tract is a pure Rust inference engine: no C++ runtime to install, CPU only.

use crate::config::RemovalConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use instant::{Duration, Instant};
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the optimized runnable Tract model
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Holds the optimized tract plan once the model is loaded
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: ModelManager,
}

impl TractBackend {
    /// List Tract execution providers (`(name, available, description)`)
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust inference, always available".to_string(),
        )]
    }

    /// Create a Tract backend for the given model
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager,
        }
    }

    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_data = self.model_manager.load_model()?;
        let model_path = self.model_manager.get_model_path().to_path_buf();
        let (n, c, h, w) = self.model_manager.get_info().input_shape;

        log::info!("🚀 Initializing Tract backend for {}", model_path.display());

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .and_then(|model| model.with_input_fact(0, f32::fact([n, c, h, w]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                BgRemovalError::model_error_with_context(
                    "load",
                    &model_path,
                    &e.to_string(),
                    &["check that the file is a valid ONNX model"],
                )
            })?;

        self.model = Some(model);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::inference("Tract model not initialized"))?;

        log::debug!("🔮 Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        // tract links its own ndarray, so the mask is copied across by value
        let [n, c, h, w]: [usize; 4] = output_data.shape().try_into().map_err(|_| {
            BgRemovalError::inference(format!(
                "Mask output is not 4D: shape {:?}",
                output_data.shape()
            ))
        })?;
        let output_array =
            Array4::from_shape_vec((n, c, h, w), output_data.iter().copied().collect())
                .map_err(|e| {
                    BgRemovalError::inference(format!("Mask output reshape failed: {e}"))
                })?;

        log::debug!(
            "✅ Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );

        Ok(output_array)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.model_manager.get_preprocessing_config().clone()
    }

    fn model_info(&self) -> ModelInfo {
        self.model_manager.get_info().clone()
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}
