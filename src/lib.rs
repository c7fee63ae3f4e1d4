#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # bgremove-studio
//!
//! A background removal workflow built around a small state machine: load an
//! image, remove its background with a U2-Net style segmentation model, save
//! the result with transparency.
//!
//! ## Features
//!
//! - **Workflow controller**: [`WorkflowController`] owns the [`Session`] and
//!   enforces which of `load`, `process`, `save` and `reset` are valid in each
//!   [`Phase`]
//! - **Non-blocking removal**: inference runs on tokio's blocking pool; late
//!   results from a superseded session are discarded
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Format Support**: PNG, JPEG, WebP, BMP, GIF and TIFF input; PNG, JPEG,
//!   WebP, BMP and TIFF output
//! - **CLI Integration**: `bgremove` one-shot tool and `bgremove-studio`
//!   interactive mode (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_studio::{
//!     BackgroundRemovalProcessor, FileImageStore, ModelSpec, RemovalConfig, WorkflowController,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .model_spec(ModelSpec::external("models/u2net.onnx"))
//!     .build()?;
//! let processor = BackgroundRemovalProcessor::new(config)?;
//!
//! let mut controller =
//!     WorkflowController::new(Arc::new(processor), Arc::new(FileImageStore::default()));
//! controller.load("photo.jpg")?;
//! controller.process_and_wait().await?;
//! let saved_to = controller.save_default()?;
//! println!("{}", saved_to.display());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): binaries and tracing setup
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`, `tracing-files`: extra log outputs for the binaries

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{ExecutionProvider, OutputFormat, RemovalConfig, RemovalConfigBuilder};
pub use controller::{CompletionOutcome, Status, WorkflowController};
pub use error::{BgRemovalError, ErrorKind, Result};
pub use inference::InferenceBackend;
pub use models::{ModelManager, ModelSource, ModelSpec};
pub use processor::{
    BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory,
};
pub use services::{
    BackgroundRemover, ConsoleProgressReporter, FileImageStore, ImageStore, NoOpProgressReporter,
    OutputFormatHandler, ProcessingStage, ProgressReporter, ProgressUpdate,
};
pub use session::{Action, Phase, Session};
pub use types::{MaskStatistics, ProcessingTimings, RemovalResult, SegmentationMask};
pub use utils::{
    ExecutionProviderManager, ImagePreprocessor, Letterbox, PreprocessingOptions, ProviderInfo,
};

#[cfg(feature = "cli")]
pub use tracing_config::{
    init_cli_tracing, TracingConfig, TracingFormat, TracingGuard, TracingOutput,
};

/// Remove the background from an in-memory image
///
/// Builds a one-off processor, so the model is loaded on every call. Keep a
/// [`BackgroundRemovalProcessor`] around when processing several images.
///
/// # Examples
///
/// ```rust,no_run
/// use bgremove_studio::{remove_background_from_image, RemovalConfig};
///
/// # fn example(img: image::DynamicImage) -> anyhow::Result<()> {
/// let result = remove_background_from_image(&img, &RemovalConfig::default())?;
/// result.into_image().save("output.png")?;
/// # Ok(())
/// # }
/// ```
pub fn remove_background_from_image(
    image: &image::DynamicImage,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_image(image)
}

/// Remove the background from encoded image bytes (JPEG, PNG, WebP, BMP, TIFF)
pub fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| BgRemovalError::decode(format!("Failed to decode image from bytes: {}", e)))?;
    remove_background_from_image(&image, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_a_decode_error() {
        let err = remove_background_from_bytes(b"not an image", &RemovalConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_missing_model_is_a_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RemovalConfig::builder()
            .model_spec(ModelSpec::external(dir.path().join("nope.onnx")))
            .build()
            .unwrap();
        let image = image::DynamicImage::new_rgb8(8, 8);

        let err = remove_background_from_image(&image, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);
    }
}
