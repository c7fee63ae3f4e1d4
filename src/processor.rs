//! Background removal processor
//!
//! [`BackgroundRemovalProcessor`] is the concrete [`BackgroundRemover`]: it
//! resolves the model, lazily creates and initializes an inference backend,
//! and runs preprocessing, inference, mask generation and alpha compositing.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::ModelManager,
    services::{BackgroundRemover, ProcessingStage, ProgressReporter, ProgressUpdate},
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{ImagePreprocessor, Letterbox},
};
use image::{DynamicImage, GenericImageView};
use instant::{Duration, Instant};
use log::{debug, info, warn};
use ndarray::Array4;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{instrument, span, Level};

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled by feature flags
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(BgRemovalError::invalid_config(format!(
                    "Backend '{other}' is not compiled in; rebuild with the '{other}' feature"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Background removal through a segmentation model
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Mutex<Option<Box<dyn InferenceBackend>>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor using the compiled-in backends
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: RemovalConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
            backend: Mutex::new(None),
            progress_reporter: None,
        })
    }

    /// Report processing stages to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Whether the backend has been created and initialized
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock_backend()
            .as_ref()
            .is_some_and(|backend| backend.is_initialized())
    }

    /// Create and initialize the backend now instead of on first use
    ///
    /// # Errors
    /// - Model cannot be resolved or loaded
    /// - Backend not available
    pub fn initialize(&self) -> Result<()> {
        let mut guard = self.lock_backend();
        self.ensure_backend(&mut guard, Instant::now())?;
        Ok(())
    }

    /// A backend that panicked mid-call is dropped so the next call rebuilds it
    fn lock_backend(&self) -> MutexGuard<'_, Option<Box<dyn InferenceBackend>>> {
        self.backend.lock().unwrap_or_else(|poisoned| {
            warn!("Inference backend panicked during an earlier call; recreating it");
            let mut guard = poisoned.into_inner();
            *guard = None;
            self.backend.clear_poison();
            guard
        })
    }

    fn report(&self, stage: ProcessingStage, start: Instant) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report_stage(ProgressUpdate::new(stage, start));
        }
    }

    /// Returns the model load time when this call initialized the backend
    fn ensure_backend<'a>(
        &self,
        slot: &'a mut Option<Box<dyn InferenceBackend>>,
        start: Instant,
    ) -> Result<(&'a mut Box<dyn InferenceBackend>, Option<Duration>)> {
        if slot.is_none() {
            self.report(ProcessingStage::Initialization, start);
            info!("Initializing background removal processor");
            debug!("Model spec: {:?}", self.config.model_spec);
            debug!("Backend type: {:?}", self.config.backend_type);
            debug!("Execution provider: {:?}", self.config.execution_provider);

            let model_manager = ModelManager::from_spec(&self.config.model_spec)?;
            let backend = self
                .backend_factory
                .create_backend(self.config.backend_type, model_manager)?;
            *slot = Some(backend);
        }

        let initialized = match slot.as_mut() {
            Some(backend) => backend.initialize(&self.config),
            None => Err(BgRemovalError::internal("Backend slot empty after creation")),
        };

        match initialized {
            Ok(load_time) => slot
                .as_mut()
                .map(|backend| (backend, load_time))
                .ok_or_else(|| BgRemovalError::internal("Backend slot empty after creation")),
            Err(e) => {
                // Drop the half-initialized backend so the next call starts over
                *slot = None;
                Err(e)
            },
        }
    }

    /// Remove the background of `image`, returning the result with its mask
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Inference execution errors
    /// - Mask generation failures
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            model = %self.config.model_spec.source.display_name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&self, image: &DynamicImage) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let original_dimensions = image.dimensions();

        let mut guard = self.lock_backend();
        let (backend, load_time) = self.ensure_backend(&mut guard, total_start)?;
        if let Some(load_time) = load_time {
            timings.model_load_ms = millis(load_time);
            let model = backend.model_info();
            debug!(
                "Model {} ready ({} bytes, input {:?}) in {}ms",
                model.name, model.size_bytes, model.input_shape, timings.model_load_ms
            );
        }

        let (input_tensor, letterbox) = {
            let _span = span!(
                Level::DEBUG,
                "preprocessing",
                original_width = %original_dimensions.0,
                original_height = %original_dimensions.1
            )
            .entered();
            self.report(ProcessingStage::Preprocessing, total_start);
            let start = Instant::now();
            let preprocessing_config = backend.preprocessing_config();
            let prepared =
                ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
            timings.preprocessing_ms = millis(start.elapsed());
            prepared
        };

        let output_tensor = {
            let _span =
                span!(Level::INFO, "inference", backend = %self.config.backend_type).entered();
            self.report(ProcessingStage::Inference, total_start);
            let start = Instant::now();
            let output = backend.infer(&input_tensor)?;
            timings.inference_ms = millis(start.elapsed());
            output
        };
        drop(guard);

        if self.config.debug {
            log_tensor_statistics(&output_tensor);
        }

        let (mask, result_image) = {
            let _span = span!(Level::DEBUG, "background_removal").entered();
            self.report(ProcessingStage::MaskGeneration, total_start);
            let start = Instant::now();
            let mask = Self::tensor_to_mask(&output_tensor, &letterbox, original_dimensions)?;
            let result_image = mask.apply_to_image(&image.to_rgba8())?;
            timings.postprocessing_ms = millis(start.elapsed());
            (mask, result_image)
        };

        timings.total_ms = millis(total_start.elapsed());
        let stats = mask.statistics();
        info!(
            "📊 Removal complete: {}ms total, {:.1}% foreground",
            timings.total_ms,
            stats.foreground_ratio * 100.0
        );
        if let Some(reporter) = &self.progress_reporter {
            reporter.report_completion(&timings);
        }

        Ok(RemovalResult {
            image: result_image,
            mask,
            timings,
        })
    }

    /// Map the first output channel back onto the original image
    ///
    /// Values are min-max normalized over the tensor before quantization.
    fn tensor_to_mask(
        tensor: &Array4<f32>,
        letterbox: &Letterbox,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let (batch, channels, height, width) = tensor.dim();
        if batch != 1 || channels < 1 {
            return Err(BgRemovalError::processing(format!(
                "Invalid output tensor shape {:?}",
                tensor.shape()
            )));
        }
        if (height, width) != (letterbox.canvas_height as usize, letterbox.canvas_width as usize) {
            return Err(BgRemovalError::processing(format!(
                "Output tensor {width}x{height} does not match model input {}x{}",
                letterbox.canvas_width, letterbox.canvas_height
            )));
        }

        let channel = tensor.slice(ndarray::s![0, 0, .., ..]);
        let (min, max) = channel
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;
        let normalize = |value: f32| {
            if range > f32::EPSILON {
                (value - min) / range
            } else {
                value.clamp(0.0, 1.0)
            }
        };

        let (orig_width, orig_height) = original_dimensions;
        let mut data = Vec::with_capacity(orig_width as usize * orig_height as usize);
        for y in 0..orig_height {
            for x in 0..orig_width {
                let value = letterbox
                    .to_canvas(x, y)
                    .and_then(|(cx, cy)| channel.get([cy as usize, cx as usize]).copied())
                    .map_or(0.0, normalize);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                data.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }

        Ok(SegmentationMask::new(data, original_dimensions))
    }
}

impl BackgroundRemover for BackgroundRemovalProcessor {
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage> {
        self.process_image(image).map(RemovalResult::into_image)
    }
}

fn log_tensor_statistics(tensor: &Array4<f32>) {
    let (min, max, sum) = tensor.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, 0.0_f64),
        |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + f64::from(v)),
    );
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / tensor.len().max(1) as f64;
    info!(
        "🔍 Output tensor {:?}: min {min:.4}, max {max:.4}, mean {mean:.4}",
        tensor.shape()
    );
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackend, MockBackendFactory};
    use crate::models::ModelSpec;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn processor_with(backend: MockBackend) -> (BackgroundRemovalProcessor, TempDir) {
        processor_with_backends(vec![backend], false)
    }

    fn processor_with_backends(
        backends: Vec<MockBackend>,
        debug: bool,
    ) -> (BackgroundRemovalProcessor, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("u2net.onnx");
        std::fs::write(&model, b"mock").unwrap();

        let config = RemovalConfig::builder()
            .model_spec(ModelSpec::external(&model))
            .debug(debug)
            .build()
            .unwrap();
        let processor = BackgroundRemovalProcessor::with_factory(
            config,
            Box::new(MockBackendFactory::with_backends(backends)),
        )
        .unwrap();
        (processor, dir)
    }

    #[test]
    fn test_lazy_initialization() {
        let backend = MockBackend::new();
        let history = backend.call_history();
        let (processor, _dir) = processor_with(backend);

        assert!(!processor.is_initialized());
        assert!(history.lock().unwrap().is_empty());

        processor.initialize().unwrap();
        assert!(processor.is_initialized());
        assert_eq!(*history.lock().unwrap(), vec!["initialize"]);
    }

    #[test]
    fn test_process_square_image() {
        let (processor, _dir) = processor_with(MockBackend::new());
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 320, Rgb([200, 100, 50])));

        let result = processor.process_image(&image).unwrap();
        assert_eq!(result.image.dimensions(), (320, 320));
        assert_eq!(result.mask.dimensions, (320, 320));

        // Mock foreground is the central square of the model input
        assert_eq!(result.image.get_pixel(160, 160).0, [200, 100, 50, 255]);
        assert_eq!(result.image.get_pixel(5, 5).0, [0, 0, 0, 0]);

        let stats = result.mask.statistics();
        assert!((stats.foreground_ratio - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_process_letterboxed_image() {
        let (processor, _dir) = processor_with(MockBackend::new());
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([10, 20, 30])));

        let output = processor.remove(&image).unwrap();
        assert_eq!(output.dimensions(), (300, 200));
        assert!(output.color().has_alpha());

        let rgba = output.to_rgba8();
        assert_eq!(rgba.get_pixel(150, 100)[3], 255);
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let (processor, _dir) = processor_with(MockBackend::new_failing_inference());
        let image = DynamicImage::new_rgb8(16, 16);

        let err = processor.remove(&image).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }

    #[test]
    fn test_initialization_failure_propagates() {
        let (processor, _dir) = processor_with(MockBackend::new_failing_init());
        let err = processor.remove(&DynamicImage::new_rgb8(4, 4)).unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
        assert!(!processor.is_initialized());
    }

    #[test]
    fn test_backend_panic_does_not_block_later_calls() {
        let (processor, _dir) = processor_with_backends(
            vec![MockBackend::new_panicking_inference(), MockBackend::new()],
            false,
        );
        let image = DynamicImage::new_rgb8(16, 16);

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            processor.remove(&image)
        }));
        assert!(panicked.is_err());
        assert!(!processor.is_initialized());

        let output = processor.remove(&image).unwrap();
        assert_eq!(output.dimensions(), (16, 16));
        assert!(processor.is_initialized());
    }

    #[tokio::test]
    async fn test_retry_after_backend_panic_through_controller() {
        use crate::controller::WorkflowController;
        use crate::services::FileImageStore;
        use crate::session::Phase;

        let (processor, dir) = processor_with_backends(
            vec![MockBackend::new_panicking_inference(), MockBackend::new()],
            false,
        );
        let source = dir.path().join("photo.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([90, 90, 90])))
            .save(&source)
            .unwrap();
        let mut controller = WorkflowController::new(
            Arc::new(processor),
            Arc::new(FileImageStore::default()),
        );
        controller.load(&source).unwrap();

        let err = controller.process_and_wait().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Processing);
        assert_eq!(controller.phase(), Phase::Loaded);

        controller.process_and_wait().await.unwrap();
        assert_eq!(controller.phase(), Phase::Done);
        assert_eq!(
            controller.session().result_image().unwrap().dimensions(),
            (40, 30)
        );
    }

    #[test]
    fn test_debug_mode_processes_normally() {
        let (processor, _dir) = processor_with_backends(vec![MockBackend::new()], true);
        assert!(processor.config().debug);
        let output = processor.remove(&DynamicImage::new_rgb8(32, 32)).unwrap();
        assert_eq!(output.dimensions(), (32, 32));
    }

    #[test]
    fn test_missing_model_is_reported_on_first_use() {
        let config = RemovalConfig::builder()
            .model_spec(ModelSpec::external("/nowhere/u2net.onnx"))
            .build()
            .unwrap();
        let processor = BackgroundRemovalProcessor::with_factory(
            config,
            Box::new(MockBackendFactory::new(MockBackend::new())),
        )
        .unwrap();

        let err = processor.remove(&DynamicImage::new_rgb8(4, 4)).unwrap_err();
        assert!(err.to_string().contains("/nowhere/u2net.onnx"));
    }

    #[test]
    fn test_tensor_to_mask_normalizes() {
        let letterbox = Letterbox::fit((2, 2), [2, 2]).unwrap();
        let tensor = Array4::from_shape_vec((1, 1, 2, 2), vec![2.0, 3.0, 4.0, 6.0]).unwrap();

        let mask = BackgroundRemovalProcessor::tensor_to_mask(&tensor, &letterbox, (2, 2)).unwrap();
        assert_eq!(mask.data, vec![0, 64, 128, 255]);
    }

    #[test]
    fn test_tensor_to_mask_rejects_wrong_size() {
        let letterbox = Letterbox::fit((2, 2), [4, 4]).unwrap();
        let tensor = Array4::<f32>::zeros((1, 1, 2, 2));
        assert!(BackgroundRemovalProcessor::tensor_to_mask(&tensor, &letterbox, (2, 2)).is_err());
    }

    #[test]
    fn test_default_factory_lists_compiled_backends() {
        let backends = DefaultBackendFactory.available_backends();
        assert_eq!(backends.contains(&BackendType::Onnx), cfg!(feature = "onnx"));
        assert_eq!(backends.contains(&BackendType::Tract), cfg!(feature = "tract"));
    }
}
