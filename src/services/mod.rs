//! Services the workflow controller delegates to
//!
//! - [`io`]: image decoding and encoding
//! - [`format`]: output format selection and conversion
//! - [`progress`]: stage reporting for front ends
//! - [`removal`]: the background removal seam

pub mod format;
pub mod io;
pub mod progress;
pub mod removal;

pub use format::{OutputFormatHandler, SUPPORTED_INPUT_EXTENSIONS};
pub use io::{FileImageStore, ImageStore};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
pub use removal::BackgroundRemover;
