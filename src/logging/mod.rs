//! Logging infrastructure - structured tracing for loading, install and calls
//!
//! Events carry a target per layer (`ffibind::loader`, `ffibind::install`,
//! `ffibind::call`) so each can be filtered on its own. Nothing is emitted
//! until a subscriber exists; `init` installs one from `FFIBIND_LOG_*`, and
//! embedding applications may install their own instead.

use std::io;
use std::path::Path;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the file writer flushing for the life of the process
static FILE_GUARD: OnceCell<Mutex<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; console output when unset
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // FFIBIND_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("FFIBIND_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // FFIBIND_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("FFIBIND_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("FFIBIND_LOG_JSON").is_ok();
        config.show_spans = std::env::var("FFIBIND_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for chasing marshalling problems
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call has any effect. If another global subscriber is
/// already installed it is left in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("ffibind={}", config.level.as_str().to_lowercase())));

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let writer = match config.log_path.as_deref() {
            Some(path) => file_writer(Path::new(path)),
            None => BoxMakeWriter::new(io::stderr),
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions));

        let layer = if config.json_format {
            layer.json().with_filter(env_filter).boxed()
        } else {
            layer.with_filter(env_filter).boxed()
        };

        // Ignore error if a subscriber was installed elsewhere
        tracing_subscriber::registry().with(layer).try_init().ok();
    });
}

fn file_writer(path: &Path) -> BoxMakeWriter {
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let file_name = path.file_name().map_or_else(|| "ffibind.log".into(), |n| n.to_owned());

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    FILE_GUARD.get_or_init(|| Mutex::new(guard));
    BoxMakeWriter::new(writer)
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Log a library handle being opened
pub fn log_library_open(filename: &str) {
    use tracing::info;
    info!(target: "ffibind::loader", event = "library_open", library = filename, "library opened");
}

/// Log a library handle being closed
pub fn log_library_close(filename: &str) {
    use tracing::debug;
    debug!(target: "ffibind::loader", event = "library_close", library = filename, "library closed");
}

/// Log a resolved symbol
#[inline]
pub fn log_symbol(library: &str, symbol: &str, address: *const core::ffi::c_void) {
    use tracing::trace;
    trace!(
        target: "ffibind::loader",
        event = "symbol",
        library,
        symbol,
        address = ?address,
        "symbol resolved"
    );
}

/// Log a header installed into its fields
pub fn log_install(header: &str, library: &str, fields: usize) {
    use tracing::info;
    info!(
        target: "ffibind::install",
        event = "install",
        header,
        library,
        fields,
        "header installed"
    );
}

/// Log a failed install
pub fn log_install_error(header: &str, error: &str) {
    use tracing::error;
    error!(target: "ffibind::install", event = "install_error", header, error, "install failed");
}

/// Log a bound call
#[inline]
pub fn log_call(symbol: &str, arg_count: usize) {
    use tracing::trace;
    trace!(target: "ffibind::call", event = "call", symbol, args = arg_count, "native call");
}

/// Log a failed call
pub fn log_call_error(symbol: &str, error: &str) {
    use tracing::warn;
    warn!(target: "ffibind::call", event = "call_error", symbol, error, "native call failed");
}

/// Log a fallible native function reporting failure
pub fn log_native_failure(symbol: &str, text: &str) {
    use tracing::debug;
    debug!(target: "ffibind::call", event = "native_failure", symbol, text, "native call reported failure");
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &str) -> PerformanceGuard {
        PerformanceGuard {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: String,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = %self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}
