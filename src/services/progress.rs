//! Progress reporting service
//!
//! Separates progress reporting from the workflow and processing logic so each
//! front end decides how stages are surfaced: the one-shot CLI prints them on
//! stdout, the interactive mode relies on its status line instead.

use crate::types::ProcessingTimings;
use instant::Instant;

/// Progress stages of loading, processing and saving one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Reading and decoding the input image
    ImageLoading,
    /// Input image decoded
    ImageLoaded,
    /// Removal submitted to the background worker
    BackgroundRemoval,
    /// Initializing backend and loading model
    Initialization,
    /// Preprocessing image for inference
    Preprocessing,
    /// Running model inference
    Inference,
    /// Converting output tensor to mask and applying it as alpha
    MaskGeneration,
    /// Encoding and writing the result
    FileSaving,
    /// Result written
    FileSaved,
    /// Workflow completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading image",
            ProcessingStage::ImageLoaded => "Image loaded",
            ProcessingStage::Initialization => "Initializing model and backend",
            ProcessingStage::Preprocessing => "Preprocessing image",
            ProcessingStage::Inference => "Running inference",
            ProcessingStage::MaskGeneration => "Generating segmentation mask",
            ProcessingStage::BackgroundRemoval => "Removing background",
            ProcessingStage::FileSaving => "Saving result",
            ProcessingStage::FileSaved => "Image saved",
            ProcessingStage::Completed => "Done",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ImageLoading => 5,
            ProcessingStage::ImageLoaded => 10,
            ProcessingStage::BackgroundRemoval => 15,
            ProcessingStage::Initialization => 20,
            ProcessingStage::Preprocessing => 30,
            ProcessingStage::Inference => 70,
            ProcessingStage::MaskGeneration => 85,
            ProcessingStage::FileSaving => 95,
            ProcessingStage::FileSaved => 99,
            ProcessingStage::Completed => 100,
        }
    }

    /// Stages internal to a single removal call
    #[must_use]
    pub fn is_processor_stage(&self) -> bool {
        matches!(
            self,
            ProcessingStage::Initialization
                | ProcessingStage::Preprocessing
                | ProcessingStage::Inference
                | ProcessingStage::MaskGeneration
        )
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Stage detail: a path, dimensions, or the stage description
    pub description: String,
    /// Elapsed time since the operation started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
            stage,
            description,
        }
    }
}

/// Trait for reporting progress during background removal operations
pub trait ProgressReporter: Send + Sync {
    /// Report entering (or finishing) a stage
    fn report_stage(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_stage(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter printing workflow diagnostics on stdout
///
/// Processor-internal stages and timings are only printed when verbose.
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Line printed for an update, if any
    #[must_use]
    pub fn format_update(&self, update: &ProgressUpdate) -> Option<String> {
        match update.stage {
            ProcessingStage::ImageLoading => {
                Some(format!("📂 Loading image: {}", update.description))
            },
            ProcessingStage::ImageLoaded => {
                Some(format!("✅ Image loaded: {}", update.description))
            },
            ProcessingStage::BackgroundRemoval => Some("⏳ Removing background...".to_string()),
            ProcessingStage::FileSaved => Some(format!("✅ Image saved: {}", update.description)),
            ProcessingStage::Completed => Some("🎉 Done!".to_string()),
            ProcessingStage::FileSaving => None,
            stage if stage.is_processor_stage() && self.verbose => Some(format!(
                "   [{}%] {} ({}ms)",
                update.progress, update.description, update.elapsed_ms
            )),
            _ => None,
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_stage(&self, update: ProgressUpdate) {
        log::debug!("[{}%] {}", update.progress, update.description);
        if let Some(line) = self.format_update(&update) {
            println!("{line}");
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("✅ Background removal completed in {}ms", timings.total_ms);

        if self.verbose {
            println!("   📊 Detailed timings:");
            println!("     • Model load: {}ms", timings.model_load_ms);
            println!("     • Preprocessing: {}ms", timings.preprocessing_ms);
            println!("     • Inference: {}ms", timings.inference_ms);
            println!("     • Postprocessing: {}ms", timings.postprocessing_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::debug!("Error during {}: {}", stage.description(), error);
        println!("❌ Error: {error}");
    }
}
