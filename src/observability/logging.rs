//! Logging initialization for `lesim`.
//!
//! Verbosity flags widen logging for this crate only; dependencies stay at
//! `warn` until `-vvvv`. Line-by-line transitions are traced under
//! `lesim::phase`, so `-vvv` is the level for following a subject through
//! its phases. `LESIM_LOG_LEVEL` replaces the flags entirely.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable that overrides the verbosity flags.
pub const LOG_LEVEL_ENV: &str = "LESIM_LOG_LEVEL";

/// Environment variable selecting the log format (`human` or `json`).
pub const LOG_FORMAT_ENV: &str = "LESIM_LOG_FORMAT";

/// Log output format.
///
/// Controls how log messages are rendered to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON for machine consumption.
    Json,
}

impl LogFormat {
    /// Format named by `value`; anything other than `json` is human.
    #[must_use]
    pub fn from_name(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(name) if name.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Human,
        }
    }

    /// Format from `LESIM_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_name(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }
}

/// Maps a verbosity level to filter directives.
///
/// - 0 → warnings and errors only
/// - 1 → `lesim` at `info`
/// - 2 → `lesim` at `debug` (phase entry and completion, compiled phases)
/// - 3 → line transitions under `lesim::phase` at `trace`
/// - 4+ → everything at `trace`, dependencies included
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,lesim=info",
        2 => "warn,lesim=debug",
        3 => "warn,lesim=debug,lesim::phase=trace",
        _ => "trace",
    }
}

/// Directives in effect: a non-blank `env_value` wins over `verbosity`.
#[must_use]
pub fn filter_directives(env_value: Option<&str>, verbosity: u8) -> String {
    match env_value.map(str::trim) {
        Some(directives) if !directives.is_empty() => directives.to_string(),
        _ => verbosity_to_directive(verbosity).to_string(),
    }
}

/// Builds the filter, falling back to the verbosity level when the
/// environment value does not parse.
fn build_filter(env_value: Option<&str>, verbosity: u8) -> EnvFilter {
    EnvFilter::try_new(filter_directives(env_value, verbosity))
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)))
}

/// Initializes the global tracing subscriber.
///
/// Targets are shown from `-vv` on, where phase and simulation events mix.
/// Uses `try_init()` so calling this more than once (e.g. in tests) is safe.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let env_value = std::env::var(LOG_LEVEL_ENV).ok();
    let filter = build_filter(env_value.as_deref(), verbosity);
    let show_target = verbosity >= 2;

    let use_ansi = match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    match format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(use_ansi)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
