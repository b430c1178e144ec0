//! # Logging Utilities
//!
//! Logging infrastructure for dwarfscan using `tracing`.
//!
//! Diagnostics go to stderr so they never mix with the tool's report on
//! stdout. Supported:
//! - Pretty output for terminals and JSON output for log collectors
//! - Environment variable configuration
//! - Optional file output through a non-blocking writer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dwarfscan_utils::init_logging;
//!
//! // Keep the guard alive until exit so buffered file output is flushed
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::warn!("abandoning unit");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Filter directives (e.g., `RUST_LOG=debug`, `RUST_LOG=dwarfscan_core=trace`)
//! - `DWARFSCAN_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `DWARFSCAN_LOG_FILE`: Also write logs to this file; a directory gets a dated file inside it

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt as stdfmt};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const FORMAT_ENV: &str = "DWARFSCAN_LOG_FORMAT";

/// Environment variable naming an additional log file
pub const FILE_ENV: &str = "DWARFSCAN_LOG_FILE";

/// Filter applied when neither an explicit level nor `RUST_LOG` is given
const DEFAULT_LEVEL: Level = Level::WARN;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

impl stdfmt::Display for LogFormat
{
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result
    {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level (default)
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level, including every buffer reload
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Keeps the background file writer alive.
///
/// Dropping the guard flushes and stops file output, so hold it until the
/// program exits. Console-only setups carry no writer.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    _writer: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging from the environment
///
/// Reads `RUST_LOG`, `DWARFSCAN_LOG_FORMAT` and `DWARFSCAN_LOG_FILE`; without
/// `RUST_LOG` only warnings and errors are shown.
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `DWARFSCAN_LOG_FORMAT` or `RUST_LOG` hold invalid values
/// - The log file cannot be created
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = format_from_env(env::var(FORMAT_ENV).ok().as_deref())?;
    let file = env::var_os(FILE_ENV).map(PathBuf::from);
    init_layers(format, None, true, file.as_deref())
}

/// Initialize console logging with explicit level and format
///
/// `RUST_LOG` is ignored; `DWARFSCAN_LOG_FILE` still adds file output.
///
/// ## Example
///
/// ```rust,no_run
/// use dwarfscan_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let file = env::var_os(FILE_ENV).map(PathBuf::from);
    init_layers(format, Some(level), true, file.as_deref())
}

/// Initialize file-only logging
///
/// Nothing is written to the console. If `path` is a directory, the log goes
/// to `YYYY-MM-DD-dwarfscan.log` inside it. With `level` unset the filter
/// comes from `RUST_LOG`, falling back to warnings.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the file cannot be
/// created.
pub fn init_logging_to_file(
    path: &Path,
    level: Option<LogLevel>,
    format: LogFormat,
) -> Result<(LoggingGuard, PathBuf), LoggingError>
{
    let resolved = resolve_log_path(path);
    let guard = init_layers(format, level, false, Some(&resolved))?;
    Ok((guard, resolved))
}

fn init_layers(
    format: LogFormat,
    level: Option<LogLevel>,
    console: bool,
    file: Option<&Path>,
) -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if console {
        layers.push(console_layer(format, build_filter(level)?));
    }

    let mut worker = None;
    if let Some(path) = file {
        let (writer, guard) = open_log_file(path)?;
        layers.push(file_layer(format, writer, build_filter(level)?));
        worker = Some(guard);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(LoggingGuard { _writer: worker })
}

/// Explicit level first, then `RUST_LOG`, then the default.
fn build_filter(level: Option<LogLevel>) -> Result<EnvFilter, LoggingError>
{
    if let Some(level) = level {
        return Ok(EnvFilter::new(Level::from(level).to_string()));
    }
    match env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(&directives).map_err(|err| LoggingError::InvalidLevel(err.to_string())),
        Err(_) => Ok(EnvFilter::new(DEFAULT_LEVEL.to_string())),
    }
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);

    match format {
        LogFormat::Pretty => layer.with_ansi(io::stderr().is_terminal()).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, writer: NonBlocking, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    match format {
        LogFormat::Pretty => layer.with_ansi(false).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn open_log_file(path: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError>
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?;

    std::fs::create_dir_all(directory)?;
    let appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Map a directory to a dated log file inside it; other paths are kept.
fn resolve_log_path(path: &Path) -> PathBuf
{
    if path.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        path.join(format!("{today}-dwarfscan.log"))
    } else {
        path.to_path_buf()
    }
}

/// Parse the format variable; unset means pretty.
fn format_from_env(value: Option<&str>) -> Result<LogFormat, LoggingError>
{
    match value {
        None => Ok(LogFormat::default()),
        Some(raw) => LogFormat::from_str(raw).map_err(LoggingError::InvalidFormat),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level or filter directive
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Log file path without a file name
    #[error("Invalid log file path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
