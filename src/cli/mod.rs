//! Command-line front ends
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;
mod studio;

pub use config::{build_processor, show_provider_diagnostics, ModelArgs};
pub use main_impl::{main, run, run_once, OneShotCli};
pub use studio::{BusyIndicator, Command, StudioCli};

/// Entry point of the interactive binary
pub async fn studio_main() -> std::process::ExitCode {
    studio::main().await
}
