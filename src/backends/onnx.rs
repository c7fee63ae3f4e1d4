//! Segmentation through ONNX Runtime
//!
//! Hardware providers are registered ahead of the CPU one. ONNX Runtime
//! falls back to CPU for any operator they cannot run.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use instant::{Duration, Instant};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// Holds the ONNX Runtime session once the model is loaded
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: ModelManager,
}

impl OnnxBackend {
    /// `(name, available, description)` for every provider this engine knows
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 System Hardware Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager,
        }
    }

    fn providers_for(provider: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match provider {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    providers.push(cuda.build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    providers.push(coreml.build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }
        providers
    }

    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_data = self.model_manager.load_model()?;

        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::providers_for(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let (intra_threads, inter_threads) = config.thread_counts();

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to enable parallel execution: {e}"))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgRemovalError::model_error_with_context(
                    "load",
                    self.model_manager.get_model_path(),
                    &e.to_string(),
                    &["check that the file is a valid ONNX model"],
                )
            })?;

        let info = self.model_manager.get_info();
        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Requested provider: {:?}", config.execution_provider);
        log::debug!("  - Threading: {intra_threads} intra-op, {inter_threads} inter-op");
        log::debug!(
            "  - Model: {} ({:.2} MB)",
            info.name,
            info.size_bytes as f64 / (1024.0 * 1024.0)
        );

        self.session = Some(session);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs avoid depending on tensor names, which differ between exports
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let first = outputs
            .keys()
            .next()
            .ok_or_else(|| BgRemovalError::inference("Model produced no outputs"))?;
        let mask = outputs
            .get(first)
            .ok_or_else(|| BgRemovalError::inference(format!("Output '{first}' is missing")))?
            .try_extract_array::<f32>()
            .map_err(|e| BgRemovalError::inference(format!("Mask output is not f32: {e}")))?
            .to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| BgRemovalError::inference(format!("Mask output is not 4D: {e}")))?;

        log::info!(
            "📊 Inference complete: {:.2}ms total",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(mask)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.model_manager.get_preprocessing_config().clone()
    }

    fn model_info(&self) -> ModelInfo {
        self.model_manager.get_info().clone()
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}
