//! Workflow controller
//!
//! [`WorkflowController`] owns the [`Session`] and is the only code that
//! mutates it. Removal runs on tokio's blocking pool; its result comes back
//! over a channel tagged with the session generation at submission time, and
//! is applied only if no `load` or `reset` happened in between.

use crate::{
    error::{BgRemovalError, Result},
    services::{
        BackgroundRemover, ImageStore, NoOpProgressReporter, ProcessingStage, ProgressReporter,
        ProgressUpdate,
    },
    session::{Action, Phase, Session},
};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Last outcome shown on the status line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    /// Nothing loaded yet, or just reset
    #[default]
    Ready,
    /// Image loaded from the named file
    Loaded { file_name: String },
    /// Removal in flight
    Processing,
    /// Removal finished
    Removed,
    /// Removal failed, source kept
    ProcessingFailed { message: String },
    /// Result written to the named file
    Saved { file_name: String },
    /// Load failed, session untouched
    LoadFailed { message: String },
    /// Save failed, result kept
    SaveFailed { message: String },
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready - load an image to begin"),
            Self::Loaded { file_name } => write!(f, "Image loaded: {file_name}"),
            Self::Processing => write!(f, "Processing..."),
            Self::Removed => write!(f, "Background removed successfully!"),
            Self::ProcessingFailed { message } => write!(f, "Processing failed: {message}"),
            Self::Saved { file_name } => write!(f, "Image saved: {file_name}"),
            Self::LoadFailed { message } => write!(f, "Could not load image: {message}"),
            Self::SaveFailed { message } => write!(f, "Could not save image: {message}"),
        }
    }
}

/// What happened to a finished removal
#[derive(Debug)]
pub enum CompletionOutcome {
    /// Result stored, phase is `Done`
    Applied,
    /// Removal failed, phase is back to `Loaded`
    Failed(BgRemovalError),
    /// Session moved on (load or reset) before the removal finished
    Discarded,
}

#[derive(Debug)]
struct Completion {
    generation: u64,
    outcome: Result<DynamicImage>,
}

/// Drives the load / process / save / reset state machine of one session
pub struct WorkflowController {
    session: Session,
    status: Status,
    generation: u64,
    in_flight: usize,
    remover: Arc<dyn BackgroundRemover>,
    store: Arc<dyn ImageStore>,
    reporter: Arc<dyn ProgressReporter>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowController")
            .field("phase", &self.session.phase())
            .field("status", &self.status)
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl WorkflowController {
    #[must_use]
    pub fn new(remover: Arc<dyn BackgroundRemover>, store: Arc<dyn ImageStore>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(),
            status: Status::Ready,
            generation: 0,
            in_flight: 0,
            remover,
            store,
            reporter: Arc::new(NoOpProgressReporter),
            completion_tx,
            completion_rx,
        }
    }

    /// Report workflow stages and failures to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Status line text: phase plus last outcome
    #[must_use]
    pub fn status_line(&self) -> String {
        format!("[{}] {}", self.session.phase(), self.status)
    }

    /// Counter bumped by every `load` and `reset`
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True exactly while the session is `Processing`
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.session.phase() == Phase::Processing
    }

    /// Whether any removal, current or stale, has not reported back yet
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.in_flight > 0
    }

    fn ensure_allowed(&self, action: Action) -> Result<()> {
        let phase = self.session.phase();
        if phase.allows(action) {
            Ok(())
        } else {
            debug!(%action, %phase, "action rejected");
            Err(BgRemovalError::invalid_state(action, phase))
        }
    }

    fn report(&self, stage: ProcessingStage, detail: String, start: Instant) {
        self.reporter
            .report_stage(ProgressUpdate::with_description(stage, detail, start));
    }

    fn invalidate_pending(&mut self) {
        if self.session.phase() == Phase::Processing {
            info!(generation = self.generation, "🚫 Outstanding removal invalidated");
        }
        self.generation += 1;
    }

    /// Decode `path` and make it the session's source image
    ///
    /// Valid in every phase. On failure the session is left untouched.
    /// Returns the image dimensions.
    ///
    /// # Errors
    /// - `FileNotFound` or `Decode` from the image store
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(u32, u32)> {
        let path = path.as_ref();
        let start = Instant::now();
        self.report(ProcessingStage::ImageLoading, path.display().to_string(), start);

        let image = match self.store.decode(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("❌ Failed to load {}: {}", path.display(), e);
                self.status = Status::LoadFailed {
                    message: e.to_string(),
                };
                self.reporter
                    .report_error(ProcessingStage::ImageLoading, &e.to_string());
                return Err(e);
            },
        };

        let (width, height) = image.dimensions();
        self.invalidate_pending();
        self.session.replace_source(image, path.to_path_buf());
        self.status = Status::Loaded {
            file_name: display_name(path),
        };

        info!(width, height, "📂 Image loaded");
        self.report(
            ProcessingStage::ImageLoaded,
            format!("{width}x{height} pixels"),
            start,
        );
        Ok((width, height))
    }

    /// Start background removal of the source image
    ///
    /// Valid only in `Loaded`. Returns as soon as the removal is submitted;
    /// the phase is `Processing` until its completion is applied through
    /// [`next_completion`](Self::next_completion).
    ///
    /// # Errors
    /// - `InvalidState` outside `Loaded`
    /// - `Internal` when called outside a tokio runtime
    pub fn process(&mut self) -> Result<()> {
        self.ensure_allowed(Action::Process)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BgRemovalError::internal(format!("Background removal needs a tokio runtime: {e}"))
        })?;
        let source = self
            .session
            .source_handle()
            .ok_or_else(|| BgRemovalError::internal("Loaded session without a source image"))?;

        self.session.begin_processing();
        self.status = Status::Processing;
        self.in_flight += 1;
        self.report(
            ProcessingStage::BackgroundRemoval,
            ProcessingStage::BackgroundRemoval.description().to_string(),
            Instant::now(),
        );

        let generation = self.generation;
        let remover = Arc::clone(&self.remover);
        let completion_tx = self.completion_tx.clone();
        info!(generation, "⏳ Background removal submitted");

        runtime.spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::task::spawn_blocking(move || remover.remove(&source)).await {
                Ok(result) => result,
                Err(join_error) => Err(BgRemovalError::processing(format!(
                    "Background removal task failed: {join_error}"
                ))),
            };
            debug!(
                generation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "removal finished"
            );

            if completion_tx.send(Completion { generation, outcome }).is_err() {
                debug!(generation, "controller dropped before removal finished");
            }
        });

        Ok(())
    }

    /// Wait for the next removal to finish and apply it
    ///
    /// Returns `None` when nothing is pending. Cancel safe.
    pub async fn next_completion(&mut self) -> Option<CompletionOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completion_rx.recv().await?;
        Some(self.apply(completion))
    }

    /// Apply a finished removal if one is ready, without waiting
    pub fn try_next_completion(&mut self) -> Option<CompletionOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completion_rx.try_recv().ok()?;
        Some(self.apply(completion))
    }

    fn apply(&mut self, completion: Completion) -> CompletionOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);

        if completion.generation != self.generation || self.session.phase() != Phase::Processing {
            debug!(
                completion_generation = completion.generation,
                current_generation = self.generation,
                "🗑️ Discarding stale removal result"
            );
            return CompletionOutcome::Discarded;
        }

        match completion.outcome {
            Ok(result) => {
                info!(
                    width = result.width(),
                    height = result.height(),
                    "✅ Background removed"
                );
                self.session.complete_processing(result);
                self.status = Status::Removed;
                CompletionOutcome::Applied
            },
            Err(e) => {
                warn!("❌ Background removal failed: {}", e);
                self.session.fail_processing();
                self.status = Status::ProcessingFailed {
                    message: e.to_string(),
                };
                self.reporter
                    .report_error(ProcessingStage::BackgroundRemoval, &e.to_string());
                CompletionOutcome::Failed(e)
            },
        }
    }

    /// Submit a removal and wait until it is applied
    ///
    /// # Errors
    /// - Anything [`process`](Self::process) rejects
    /// - The removal's own failure
    pub async fn process_and_wait(&mut self) -> Result<()> {
        self.process()?;
        let generation = self.generation;

        loop {
            match self.next_completion().await {
                Some(CompletionOutcome::Applied) => return Ok(()),
                Some(CompletionOutcome::Failed(e)) => return Err(e),
                Some(CompletionOutcome::Discarded) if self.generation == generation => {},
                Some(CompletionOutcome::Discarded) | None => {
                    return Err(BgRemovalError::internal(
                        "Removal was invalidated before it completed",
                    ));
                },
            }
        }
    }

    /// Encode the result image to `path`
    ///
    /// Valid only in `Done`. On failure the phase stays `Done`.
    ///
    /// # Errors
    /// - `InvalidState` outside `Done`
    /// - `UnsupportedFormat` or `Encode` from the image store
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.ensure_allowed(Action::Save)?;
        let path = path.as_ref();
        let result = self
            .session
            .result_image()
            .ok_or_else(|| BgRemovalError::internal("Done session without a result image"))?;

        let start = Instant::now();
        self.report(ProcessingStage::FileSaving, path.display().to_string(), start);

        if let Err(e) = self.store.encode(result, path) {
            warn!("❌ Failed to save {}: {}", path.display(), e);
            self.status = Status::SaveFailed {
                message: e.to_string(),
            };
            self.reporter
                .report_error(ProcessingStage::FileSaving, &e.to_string());
            return Err(e);
        }

        info!("💾 Result saved");
        self.status = Status::Saved {
            file_name: display_name(path),
        };
        self.report(ProcessingStage::FileSaved, path.display().to_string(), start);
        Ok(())
    }

    /// Save next to the source as `<stem>_nobg.png`, returning the path used
    ///
    /// # Errors
    /// Same as [`save`](Self::save)
    pub fn save_default(&mut self) -> Result<PathBuf> {
        let path = self.session.suggested_output_path();
        self.save(&path)?;
        Ok(path)
    }

    /// Clear the session and invalidate any outstanding removal
    pub fn reset(&mut self) {
        self.invalidate_pending();
        self.session.clear();
        self.status = Status::Ready;
        info!("🔄 Session reset");
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
