//! Editing session state
//!
//! A [`Session`] holds the one image being worked on, its background-removed
//! result, and the [`Phase`] that decides which user actions are valid. The
//! session is mutated only by the workflow controller.

use image::DynamicImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix appended to the source file stem when suggesting an output name
pub const OUTPUT_SUFFIX: &str = "_nobg";

/// Workflow phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No image loaded
    #[default]
    Empty,
    /// Source image loaded, no result yet
    Loaded,
    /// Background removal in flight
    Processing,
    /// Result image available
    Done,
}

impl Phase {
    /// Whether `action` is permitted in this phase
    #[must_use]
    pub fn allows(self, action: Action) -> bool {
        match action {
            Action::Load | Action::Reset => true,
            Action::Process => self == Self::Loaded,
            Action::Save => self == Self::Done,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Loaded => write!(f, "loaded"),
            Self::Processing => write!(f, "processing"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// User-visible workflow actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Load,
    Process,
    Save,
    Reset,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Process => write!(f, "process"),
            Self::Save => write!(f, "save"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// The single mutable unit of work
///
/// `result_image` is only ever set while a source image is present, and is
/// cleared whenever the source is replaced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    source_image: Option<Arc<DynamicImage>>,
    source_path: Option<PathBuf>,
    result_image: Option<DynamicImage>,
    phase: Phase,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn source_image(&self) -> Option<&DynamicImage> {
        self.source_image.as_deref()
    }

    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    #[must_use]
    pub fn result_image(&self) -> Option<&DynamicImage> {
        self.result_image.as_ref()
    }

    /// True when the session equals its initial value
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Suggested output path: `<stem>_nobg.png` next to the source
    #[must_use]
    pub fn suggested_output_path(&self) -> PathBuf {
        let stem = self
            .source_path
            .as_deref()
            .and_then(Path::file_stem)
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let file_name = format!("{stem}{OUTPUT_SUFFIX}.png");

        match self.source_path.as_deref() {
            Some(source) => source.with_file_name(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Shared handle to the source image for a background worker
    pub(crate) fn source_handle(&self) -> Option<Arc<DynamicImage>> {
        self.source_image.clone()
    }

    pub(crate) fn replace_source(&mut self, image: DynamicImage, path: PathBuf) {
        self.source_image = Some(Arc::new(image));
        self.source_path = Some(path);
        self.result_image = None;
        self.phase = Phase::Loaded;
    }

    pub(crate) fn begin_processing(&mut self) {
        debug_assert!(self.source_image.is_some());
        self.result_image = None;
        self.phase = Phase::Processing;
    }

    pub(crate) fn complete_processing(&mut self, result: DynamicImage) {
        self.result_image = Some(result);
        self.phase = Phase::Done;
    }

    pub(crate) fn fail_processing(&mut self) {
        self.result_image = None;
        self.phase = Phase::Loaded;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
