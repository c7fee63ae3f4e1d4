//! One-shot CLI: load one image, remove its background, save the result
//!
//! Every phase prints a diagnostic line on stdout. Any failure exits with
//! status 1 and leaves no output file behind.

use super::config::{build_processor, parse_args, show_provider_diagnostics, ModelArgs};
use crate::{
    controller::WorkflowController,
    services::{
        ConsoleProgressReporter, FileImageStore, OutputFormatHandler, ProcessingStage,
        ProgressReporter, ProgressUpdate,
    },
    tracing_config::init_cli_tracing,
};
use anyhow::{anyhow, Result};
use clap::Parser;
use instant::Instant;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

/// Remove the background of a single image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove")]
pub struct OneShotCli {
    /// Input image (png, jpg, jpeg, bmp, gif, webp, tiff)
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Option<PathBuf>,

    /// Output file; the extension selects the format (png keeps transparency)
    #[arg(value_name = "OUTPUT", required_unless_present = "show_providers")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}

pub async fn main() -> ExitCode {
    let cli = match parse_args::<OneShotCli>() {
        Ok(cli) => cli,
        Err(code) => return code,
    };

    let _tracing_guard = match init_cli_tracing(cli.model.verbose, "error") {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("⚠️  Logging disabled: {e:#}");
            None
        },
    };

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("bgremove failed: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Run the one-shot workflow described by `cli`
///
/// Failures are printed before this returns; callers only map the result to
/// an exit status.
///
/// # Errors
/// - Invalid options or unsupported output extension
/// - Load, removal or save failure
pub async fn run(cli: &OneShotCli) -> Result<()> {
    if cli.model.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let reporter: Arc<dyn ProgressReporter> =
        Arc::new(ConsoleProgressReporter::new(cli.model.verbose > 0));

    let (mut controller, input, output) = match prepare(cli, &reporter) {
        Ok(prepared) => prepared,
        Err(e) => {
            reporter.report_error(ProcessingStage::Initialization, &format!("{e:#}"));
            return Err(e);
        },
    };

    // The controller has already reported any failure
    run_once(&mut controller, reporter.as_ref(), input, output).await?;
    Ok(())
}

fn prepare<'a>(
    cli: &'a OneShotCli,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<(WorkflowController, &'a Path, &'a Path)> {
    let (Some(input), Some(output)) = (&cli.input, &cli.output) else {
        return Err(anyhow!("INPUT and OUTPUT are required"));
    };
    info!(input = %input.display(), output = %output.display(), "Starting bgremove");

    // Reject the target before spending time on inference
    OutputFormatHandler::from_path(output)?;

    let processor = build_processor(&cli.model)?.with_progress_reporter(Arc::clone(reporter));
    let store = Arc::new(FileImageStore::from_config(processor.config()));
    let controller = WorkflowController::new(Arc::new(processor), store)
        .with_progress_reporter(Arc::clone(reporter));

    Ok((controller, input.as_path(), output.as_path()))
}

/// Load `input`, remove its background and save to `output`
///
/// Reports `Completed` on success. Failures have already been reported by the
/// controller when this returns.
///
/// # Errors
/// - `FileNotFound` or `Decode` for the input
/// - Removal failures
/// - `UnsupportedFormat` or `Encode` for the output
pub async fn run_once(
    controller: &mut WorkflowController,
    reporter: &dyn ProgressReporter,
    input: &Path,
    output: &Path,
) -> crate::Result<()> {
    let start = Instant::now();

    controller.load(input)?;
    controller.process_and_wait().await?;
    controller.save(output)?;

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Workflow complete");
    reporter.report_stage(ProgressUpdate::new(ProcessingStage::Completed, start));
    Ok(())
}
