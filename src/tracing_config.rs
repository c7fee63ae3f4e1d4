//! Tracing configuration for the binaries
//!
//! Applications configure the subscriber; library code only emits `log` and
//! `tracing` events. All log output goes to stderr (or a file) so stdout stays
//! reserved for the diagnostics the user asked for.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// How log lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output with colors
    Console,
    /// Compact output without ANSI colors, for CI logs
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Where log lines are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file, never rotated
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
}

/// Keeps background log writers alive; drop it last
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Logging setup shared by `bgremove` and `bgremove-studio`
#[derive(Debug)]
pub struct TracingConfig {
    /// Number of `-v` flags
    pub verbosity: u8,
    /// Filter used when no `-v` flag is given
    pub base_level: &'static str,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directives, taking precedence over `verbosity`
    pub env_filter: Option<String>,
    /// Logged at startup to tell runs apart in shared log files
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            base_level: "info",
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Filter used at verbosity 0
    #[must_use]
    pub fn with_base_level(mut self, level: &'static str) -> Self {
        self.base_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter for the current `-v` count
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => self.base_level,
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let filter = match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);
        #[cfg_attr(not(feature = "tracing-files"), allow(unused_mut))]
        let mut guard = TracingGuard::default();

        match &self.output {
            TracingOutput::Console => match self.format {
                TracingFormat::Console => registry
                    .with(
                        fmt::layer()
                            .with_writer(std::io::stderr)
                            .with_ansi(true)
                            .with_target(false)
                            .compact(),
                    )
                    .try_init()?,
                TracingFormat::Compact => registry
                    .with(
                        fmt::layer()
                            .with_writer(std::io::stderr)
                            .with_ansi(false)
                            .with_target(false)
                            .compact(),
                    )
                    .try_init()?,
                #[cfg(feature = "tracing-json")]
                TracingFormat::Json => registry
                    .with(
                        fmt::layer()
                            .json()
                            .with_writer(std::io::stderr)
                            .with_current_span(true)
                            .with_span_list(true),
                    )
                    .try_init()?,
            },

            #[cfg(feature = "tracing-files")]
            TracingOutput::File(path) => {
                use tracing_appender::{non_blocking, rolling};

                let file_appender = rolling::never(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("bgremove.log")),
                );
                let (file_writer, file_guard) = non_blocking(file_appender);
                guard._file_guard = Some(file_guard);

                match self.format {
                    TracingFormat::Console | TracingFormat::Compact => registry
                        .with(fmt::layer().with_ansi(false).with_writer(file_writer).compact())
                        .try_init()?,
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => registry
                        .with(
                            fmt::layer()
                                .json()
                                .with_writer(file_writer)
                                .with_current_span(true)
                                .with_span_list(true),
                        )
                        .try_init()?,
                }
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "🚀 Session started");
        }

        Ok(guard)
    }
}

/// Initialize tracing with CLI defaults and a fresh session id
///
/// # Errors
/// Same as [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8, base_level: &'static str) -> anyhow::Result<TracingGuard> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_base_level(base_level)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}
