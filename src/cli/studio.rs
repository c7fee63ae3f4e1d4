//! Interactive mode
//!
//! A line-oriented front end over [`WorkflowController`]. Commands are read
//! from stdin while a removal runs in the background, so `reset` or `load`
//! can be issued while the busy indicator spins.

use super::config::{build_processor, parse_args, show_provider_diagnostics, ModelArgs};
use crate::{
    controller::{CompletionOutcome, WorkflowController},
    error::ErrorKind,
    services::FileImageStore,
    tracing_config::init_cli_tracing,
};
use anyhow::{bail, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "\
Commands:
  load <path>    Load an image (png, jpg, jpeg, bmp, gif, webp, tiff)
  process        Remove the background of the loaded image
  save [path]    Save the result (default: <name>_nobg.png next to the source)
  reset          Clear the session
  status         Show the current status
  help           Show this help
  quit           Exit";

/// Interactive background removal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-studio")]
pub struct StudioCli {
    /// Image to load on startup
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load(PathBuf),
    Process,
    Save(Option<PathBuf>),
    Reset,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parse an input line; blank lines yield `None`
    ///
    /// Paths may contain spaces and may be wrapped in quotes, as terminals do
    /// when a file is dropped onto them.
    ///
    /// # Errors
    /// - Unknown command
    /// - `load` without a path, or an argument to a command that takes none
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let argument = unquote(rest.trim());

        let command = match word.to_ascii_lowercase().as_str() {
            "load" | "open" => match argument {
                Some(path) => Self::Load(PathBuf::from(path)),
                None => bail!("Usage: load <path>"),
            },
            "save" => Self::Save(argument.map(PathBuf::from)),
            other => {
                if argument.is_some() {
                    bail!("'{other}' takes no arguments");
                }
                match other {
                    "process" | "remove" => Self::Process,
                    "reset" => Self::Reset,
                    "status" => Self::Status,
                    "help" | "?" => Self::Help,
                    "quit" | "exit" => Self::Quit,
                    _ => bail!("Unknown command '{other}'. Type 'help' for a list of commands"),
                }
            },
        };

        Ok(Some(command))
    }
}

fn unquote(argument: &str) -> Option<&str> {
    let stripped = ['"', '\'']
        .iter()
        .find_map(|q| argument.strip_prefix(*q).and_then(|a| a.strip_suffix(*q)))
        .unwrap_or(argument);
    (!stripped.is_empty()).then_some(stripped)
}

/// Spinner shown exactly while a removal is in flight
#[derive(Debug, Default)]
pub struct BusyIndicator {
    spinner: Option<ProgressBar>,
}

impl BusyIndicator {
    /// Start or stop the spinner to match `busy`
    pub fn sync(&mut self, busy: bool) {
        match (busy, self.spinner.take()) {
            (true, None) => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message("Removing background...");
                spinner.enable_steady_tick(Duration::from_millis(100));
                self.spinner = Some(spinner);
            },
            (true, Some(spinner)) => self.spinner = Some(spinner),
            (false, Some(spinner)) => spinner.finish_and_clear(),
            (false, None) => {},
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.spinner.is_some()
    }

    /// Print a line without tearing the spinner
    pub fn println(&self, line: &str) {
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

pub(crate) async fn main() -> ExitCode {
    let cli = match parse_args::<StudioCli>() {
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
            println!("❌ Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &StudioCli) -> Result<()> {
    if cli.model.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let processor = build_processor(&cli.model)?;
    let store = Arc::new(FileImageStore::from_config(processor.config()));
    let mut controller = WorkflowController::new(Arc::new(processor), store);
    let mut busy = BusyIndicator::default();

    println!("🎨 bgremove-studio - type 'help' for commands");
    if let Some(image) = &cli.image {
        execute(&mut controller, &busy, Command::Load(image.clone()));
    }
    busy.println(&controller.status_line());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !busy.is_active() {
            print!("> ");
            std::io::stdout().flush()?;
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        execute(&mut controller, &busy, command);
                        busy.println(&controller.status_line());
                    },
                    Ok(None) => {},
                    Err(e) => busy.println(&format!("❓ {e}")),
                }
            }
            Some(outcome) = controller.next_completion(), if controller.has_pending() => {
                match outcome {
                    CompletionOutcome::Discarded => debug!("stale removal discarded"),
                    CompletionOutcome::Applied | CompletionOutcome::Failed(_) => {
                        busy.sync(false);
                        busy.println(&controller.status_line());
                    },
                }
            }
        }

        busy.sync(controller.is_busy());
    }

    busy.sync(false);
    println!("👋 Bye");
    Ok(())
}

fn execute(controller: &mut WorkflowController, busy: &BusyIndicator, command: Command) {
    let result = match command {
        Command::Load(path) => controller.load(&path).map(|_| ()),
        Command::Process => controller.process(),
        Command::Save(Some(path)) => controller.save(&path),
        Command::Save(None) => controller.save_default().map(|_| ()),
        Command::Reset => {
            controller.reset();
            Ok(())
        },
        Command::Help => {
            busy.println(HELP);
            Ok(())
        },
        Command::Status | Command::Quit => Ok(()),
    };

    // Failed operations show up on the status line; rejections leave it unchanged
    if let Err(e) = result {
        if matches!(e.kind(), ErrorKind::Rejected | ErrorKind::Config)
            || matches!(e, crate::BgRemovalError::Internal(_))
        {
            busy.println(&format!("⚠️  {e}"));
        }
    }
}
