//! Interactive background removal
//!
//! Reads `load`, `process`, `save` and `reset` commands from stdin.

#[cfg(feature = "cli")]
use bgremove_studio::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> std::process::ExitCode {
    cli::studio_main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
