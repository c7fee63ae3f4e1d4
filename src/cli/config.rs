//! Arguments shared by both binaries and their conversion to `RemovalConfig`

use crate::{
    config::RemovalConfig,
    models::ModelSpec,
    processor::BackgroundRemovalProcessor,
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{error::ErrorKind, Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

/// Model and runtime options
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// U2-Net compatible ONNX model file or model directory [default: ~/.u2net/u2net.onnx]
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// JPEG quality for .jpg outputs (0-100)
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub jpeg_quality: u8,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Enable verbose output (-v: stage timings and INFO logs, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

impl ModelArgs {
    /// Build the removal configuration these arguments describe
    ///
    /// # Errors
    /// - Malformed execution provider string
    /// - Invalid option combination (e.g. `tract:cuda`)
    pub fn to_config(&self) -> Result<RemovalConfig> {
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&self.execution_provider)
                .context("Invalid execution provider format")?;

        let model_spec = self
            .model
            .as_ref()
            .map_or_else(ModelSpec::default, ModelSpec::external);

        RemovalConfig::builder()
            .model_spec(model_spec)
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .jpeg_quality(self.jpeg_quality)
            // Same thread count for intra and inter operations
            .intra_threads(self.threads)
            .inter_threads(self.threads)
            .debug(self.verbose >= 2)
            .build()
            .context("Invalid configuration")
    }
}

/// Create the processor for these arguments
///
/// The model itself is loaded on first use, so a bad model path surfaces as a
/// processing error rather than here.
///
/// # Errors
/// See [`ModelArgs::to_config`]
pub fn build_processor(args: &ModelArgs) -> Result<BackgroundRemovalProcessor> {
    let config = args.to_config()?;
    log::info!(
        "Backend: {}, Provider: {}, Model: {}",
        config.backend_type,
        config.execution_provider,
        config.model_spec.source.display_name()
    );
    BackgroundRemovalProcessor::new(config).context("Failed to create background removal processor")
}

/// Parse the process arguments, printing usage on failure
///
/// Bad arguments exit with status 1 like every other failure. `--help` and
/// `--version` exit with status 0.
pub(crate) fn parse_args<T: Parser>() -> std::result::Result<T, ExitCode> {
    T::try_parse().map_err(|e| {
        if is_informational(&e) {
            let _ = e.print();
            ExitCode::SUCCESS
        } else {
            println!("{e}");
            ExitCode::FAILURE
        }
    })
}

pub(crate) fn is_informational(error: &clap::Error) -> bool {
    matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

/// Display execution provider diagnostics
pub fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!(
            "  • {}: {} - {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\n💡 Usage: -e backend:provider (e.g. -e onnx:cuda, -e tract:cpu)");
}
