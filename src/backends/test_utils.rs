//! Scripted inference backend for processor unit tests
//!
//! Lets the processor and controller be exercised without model files or an
//! inference runtime.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
    processor::{BackendFactory, BackendType},
};
use instant::Duration;
use ndarray::Array4;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock backend returning a square foreground in the middle of the frame
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    preprocessing_config: PreprocessingConfig,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
    should_panic_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            preprocessing_config: PreprocessingConfig::default(),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
            should_panic_inference: false,
        }
    }

    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Panics inside `infer`, as a crashing native runtime would
    #[must_use]
    pub fn new_panicking_inference() -> Self {
        let mut backend = Self::new();
        backend.should_panic_inference = true;
        backend
    }

    /// Shared call log, survives the backend being boxed
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    /// 1.0 inside the central half of the tensor, 0.0 elsewhere
    fn generate_mock_output(&self) -> Array4<f32> {
        let [height, width] = self.preprocessing_config.target_size;
        let (height, width) = (height as usize, width as usize);

        Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let inside_y = y >= height / 4 && y < height * 3 / 4;
            let inside_x = x >= width / 4 && x < width * 3 / 4;
            if inside_x && inside_y {
                1.0
            } else {
                0.0
            }
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock inference failed"));
        }
        assert!(!self.should_panic_inference, "mock inference panicked");

        let [height, width] = self.preprocessing_config.target_size;
        if input.shape() != [1, 3, height as usize, width as usize] {
            return Err(BgRemovalError::inference(format!(
                "Unexpected input shape {:?}",
                input.shape()
            )));
        }

        Ok(self.generate_mock_output())
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing_config.clone()
    }

    fn model_info(&self) -> ModelInfo {
        let [height, width] = self.preprocessing_config.target_size;
        ModelInfo {
            name: "mock-model".to_string(),
            size_bytes: 1024,
            input_shape: (1, 3, height as usize, width as usize),
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out prepared mock backends, one per `create_backend` call
pub struct MockBackendFactory {
    backends: Mutex<VecDeque<MockBackend>>,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(backend: MockBackend) -> Self {
        Self::with_backends(vec![backend])
    }

    #[must_use]
    pub fn with_backends(backends: Vec<MockBackend>) -> Self {
        Self {
            backends: Mutex::new(backends.into()),
        }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        self.backends
            .lock()
            .map_err(|_| BgRemovalError::internal("mock factory poisoned"))?
            .pop_front()
            .map(|backend| Box::new(backend) as Box<dyn InferenceBackend>)
            .ok_or_else(|| BgRemovalError::internal("no mock backend left to hand out"))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_lifecycle() {
        let mut backend = MockBackend::new();
        let history = backend.call_history();
        assert!(!backend.is_initialized());

        let input = Array4::<f32>::zeros((1, 3, 320, 320));
        assert!(backend.infer(&input).is_err());

        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_some());
        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_none());

        let output = backend.infer(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, 320, 320]);
        assert!((output[[0, 0, 160, 160]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);

        assert_eq!(
            *history.lock().unwrap(),
            vec!["infer", "initialize", "initialize", "infer"]
        );
    }

    #[test]
    fn test_failing_mocks() {
        let mut backend = MockBackend::new_failing_init();
        assert!(backend.initialize(&RemovalConfig::default()).is_err());

        let mut backend = MockBackend::new_failing_inference();
        backend.initialize(&RemovalConfig::default()).unwrap();
        let input = Array4::<f32>::zeros((1, 3, 320, 320));
        assert!(backend.infer(&input).is_err());
    }

    #[test]
    fn test_factory_hands_out_backends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("u2net.onnx");
        std::fs::write(&model, b"mock").unwrap();
        let manager = || ModelManager::with_external_model(&model).unwrap();
        let config = RemovalConfig::default();

        let factory = MockBackendFactory::with_backends(vec![
            MockBackend::new_failing_init(),
            MockBackend::new(),
        ]);
        let mut first = factory.create_backend(BackendType::Onnx, manager()).unwrap();
        assert!(first.initialize(&config).is_err());
        let mut second = factory.create_backend(BackendType::Onnx, manager()).unwrap();
        assert!(second.initialize(&config).is_ok());
        assert!(factory.create_backend(BackendType::Onnx, manager()).is_err());
    }

    #[test]
    #[should_panic(expected = "mock inference panicked")]
    fn test_panicking_mock() {
        let mut backend = MockBackend::new_panicking_inference();
        backend.initialize(&RemovalConfig::default()).unwrap();
        let _ = backend.infer(&Array4::<f32>::zeros((1, 3, 320, 320)));
    }
}
