//! Logging setup for the SunSpec tools
//!
//! Console output goes to stderr so stdout stays free for rendered data. An
//! optional plain-text log file can be added alongside.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{CommonError, Result};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] Found SunSpec signature at register 40001`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the file writer flushing for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Colored level tags on the console
    pub ansi: bool,
    /// Also append plain-text logs to this file
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            log_file: None,
        }
    }
}

/// Filter level for a `-v` count; `quiet` wins over verbosity
pub fn level_for_verbosity(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` when set, otherwise `level`
fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(env_str) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(&env_str)
            .map_err(|e| CommonError::Logging(format!("Invalid RUST_LOG '{}': {}", env_str, e)));
    }
    EnvFilter::try_new(level)
        .map_err(|e| CommonError::Logging(format!("Invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber
pub fn init_with_config(config: LogConfig) -> Result<()> {
    let filter = build_filter(&config.level)?;

    let console_layer = fmt::layer()
        .event_format(BracketedLevelFormat)
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi);

    let file_layer = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path.file_name().ok_or_else(|| {
                CommonError::Logging(format!("Log file path has no file name: {}", path.display()))
            })?;
            std::fs::create_dir_all(&dir)?;

            let appender = tracing_appender::rolling::never(&dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
            match guards.lock() {
                Ok(mut guards) => guards.push(guard),
                Err(poisoned) => poisoned.into_inner().push(guard),
            }

            Some(
                fmt::layer()
                    .event_format(BracketedLevelFormat)
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .boxed(),
            )
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CommonError::Logging(e.to_string()))
}
