//! Shared fixtures for the integration tests
//!
//! The processor runs for real on top of a stand-in inference backend whose
//! output marks the central half of the model canvas as foreground.

#![allow(dead_code)]

use bgremove_studio::{
    models::{ModelInfo, PreprocessingConfig},
    BackendFactory, BackendType, BackgroundRemovalProcessor, BackgroundRemover, BgRemovalError,
    InferenceBackend, ModelManager, ModelSpec, ProcessingStage, ProcessingTimings,
    ProgressReporter, ProgressUpdate, RemovalConfig, Result,
};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// Backend whose mask is 1.0 inside the central half of the canvas
pub struct CenterSquareBackend {
    initialized: bool,
    fail_inference: bool,
    preprocessing: PreprocessingConfig,
}

impl InferenceBackend for CenterSquareBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if self.fail_inference {
            return Err(BgRemovalError::inference("simulated inference failure"));
        }
        let (_, _, height, width) = input.dim();
        Ok(Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let inside_y = y >= height / 4 && y < height * 3 / 4;
            let inside_x = x >= width / 4 && x < width * 3 / 4;
            if inside_x && inside_y {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing.clone()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "center-square".to_string(),
            size_bytes: 0,
            input_shape: (1, 3, 320, 320),
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out [`CenterSquareBackend`]s
#[derive(Default)]
pub struct CenterSquareFactory {
    pub fail_inference: bool,
}

impl BackendFactory for CenterSquareFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(CenterSquareBackend {
            initialized: false,
            fail_inference: self.fail_inference,
            preprocessing: model_manager.get_preprocessing_config().clone(),
        }))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx]
    }
}

/// Placeholder model file; the stand-in backend never reads it
pub fn write_model(dir: &Path) -> PathBuf {
    let path = dir.join("u2net.onnx");
    std::fs::write(&path, b"placeholder").unwrap();
    path
}

pub fn processor(dir: &Path, factory: CenterSquareFactory) -> BackgroundRemovalProcessor {
    let config = RemovalConfig::builder()
        .model_spec(ModelSpec::external(write_model(dir)))
        .build()
        .unwrap();
    BackgroundRemovalProcessor::with_factory(config, Box::new(factory)).unwrap()
}

/// Opaque gradient photo written with the encoder the extension selects
pub fn write_photo(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    DynamicImage::ImageRgb8(image).save(&path).unwrap();
    path
}

/// Fails a fixed number of times, then makes the left half transparent
pub struct FlakyRemover {
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FlakyRemover {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        })
    }
}

impl BackgroundRemover for FlakyRemover {
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BgRemovalError::processing("service unavailable"));
        }

        let mut rgba = image.to_rgba8();
        let half = rgba.width() / 2;
        for (x, _, pixel) in rgba.enumerate_pixels_mut() {
            if x < half {
                pixel.0 = [0, 0, 0, 0];
            }
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

/// Blocks each call until the test releases it
pub struct GatedRemover {
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedRemover {
    pub fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                release: Mutex::new(rx),
            }),
            tx,
        )
    }
}

impl BackgroundRemover for GatedRemover {
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage> {
        self.release
            .lock()
            .unwrap()
            .recv()
            .map_err(|_| BgRemovalError::processing("gate dropped"))?;
        Ok(DynamicImage::ImageRgba8(image.to_rgba8()))
    }
}

/// Records everything reported to it
#[derive(Default)]
pub struct RecordingReporter {
    pub updates: Mutex<Vec<ProgressUpdate>>,
    pub errors: Mutex<Vec<(ProcessingStage, String)>>,
    pub completions: AtomicUsize,
}

impl RecordingReporter {
    pub fn stages(&self) -> Vec<ProcessingStage> {
        self.updates.lock().unwrap().iter().map(|u| u.stage).collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_stage(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }

    fn report_completion(&self, _timings: &ProcessingTimings) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.errors.lock().unwrap().push((stage, error.to_string()));
    }
}
