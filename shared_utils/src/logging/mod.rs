//! Logging module for the tunnel client.
//!
//! This module provides structured logging functionality using the `tracing` crate.
//! The process installs a console subscriber at startup; the first resolved
//! client configuration then switches its level and destination in place.

use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*, reload};

use crate::config::ClientCommonConfig;

/// Log initialization options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level (default: INFO)
    pub level: Level,

    /// Whether to log to stdout (default: true)
    pub log_to_stdout: bool,

    /// Whether to log to a file (default: false)
    pub log_to_file: bool,

    /// Directory to store log files (default: "./logs")
    pub log_dir: String,

    /// Base filename for log files (default: "tunnel-launcher.log")
    pub log_file_name: String,

    /// Rotated files to keep, one per day (default: 3)
    pub max_log_files: usize,

    /// Whether to use JSON format for logs (default: false)
    pub json_format: bool,

    /// Whether to colorize console output (default: true)
    pub ansi: bool,

    /// Whether to include file and line information (default: true)
    pub include_file_line: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            level: Level::INFO,
            log_to_stdout: true,
            log_to_file: false,
            log_dir: "./logs".to_string(),
            log_file_name: "tunnel-launcher.log".to_string(),
            max_log_files: 3,
            json_format: false,
            ansi: true,
            include_file_line: true,
        }
    }
}

impl LogOptions {
    /// Map the log settings of a client configuration.
    ///
    /// `log_file = "console"` logs to stdout; anything else is a file path
    /// rotated daily and kept for `log_max_days`.
    pub fn from_common(common: &ClientCommonConfig) -> Self {
        let mut options = LogOptions {
            level: parse_level(&common.log_level),
            ansi: !common.disable_log_color,
            max_log_files: common.log_max_days.max(1) as usize,
            ..Default::default()
        };

        if common.log_file != "console" {
            let path = Path::new(&common.log_file);
            options.log_to_stdout = false;
            options.log_to_file = true;
            options.log_dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.display().to_string(),
                _ => ".".to_string(),
            };
            if let Some(file_name) = path.file_name() {
                options.log_file_name = file_name.to_string_lossy().into_owned();
            }
        }

        options
    }
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn file_appender(options: &LogOptions) -> Option<RollingFileAppender> {
    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&options.log_file_name)
        .max_log_files(options.max_log_files)
        .build(&options.log_dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!(
                "failed to open log file {}/{}: {}",
                options.log_dir, options.log_file_name, e
            );
            None
        }
    }
}

type OutputLayers = Vec<Box<dyn Layer<Registry> + Send + Sync>>;
type OutputSubscriber = Layered<reload::Layer<OutputLayers, Registry>, Registry>;

/// Reload handles onto the subscriber installed by [`init_logging`].
struct LogControl {
    filter: reload::Handle<EnvFilter, OutputSubscriber>,
    output: reload::Handle<OutputLayers, Registry>,
    configured: AtomicBool,
}

static CONTROL: OnceLock<LogControl> = OnceLock::new();

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into())
}

/// Output layers for `options`. A file that cannot be opened falls back to stdout.
fn build_output(options: &LogOptions) -> (OutputLayers, Option<WorkerGuard>) {
    let mut layers: OutputLayers = Vec::new();
    let mut guard = None;

    let appender = if options.log_to_file {
        file_appender(options)
    } else {
        None
    };

    if options.log_to_stdout || appender.is_none() {
        let stdout_layer = fmt::layer()
            .with_file(options.include_file_line)
            .with_line_number(options.include_file_line)
            .with_ansi(options.ansi)
            .with_target(true);

        let stdout_layer = if options.json_format {
            stdout_layer.json().boxed()
        } else {
            stdout_layer.boxed()
        };

        layers.push(stdout_layer);
    }

    if let Some(appender) = appender {
        let (non_blocking, worker_guard) = NonBlocking::new(appender);
        guard = Some(worker_guard);

        let file_layer = fmt::layer()
            .with_file(options.include_file_line)
            .with_line_number(options.include_file_line)
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        let file_layer = if options.json_format {
            file_layer.json().boxed()
        } else {
            file_layer.boxed()
        };

        layers.push(file_layer);
    }

    (layers, guard)
}

/// Initialize logging with the given options.
///
/// The first call in a process installs the global subscriber; later calls
/// are no-ops and return `None`. The installed subscriber can be
/// reconfigured once through [`configure_logging`]. The returned guard must
/// be kept alive for as long as file logs should be flushed.
pub fn init_logging(options: LogOptions) -> Option<WorkerGuard> {
    if tracing::dispatcher::has_been_set() {
        return None;
    }

    let (layers, guard) = build_output(&options);
    let (output, output_handle) = reload::Layer::new(layers);
    let (filter, filter_handle) = reload::Layer::new(build_filter(options.level));

    let subscriber = tracing_subscriber::registry().with(output).with(filter);
    // Another thread may have won the race
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return guard;
    }

    // Bridge `log` crate records into `tracing` so dependency logs are captured
    let _ = LogTracer::init();

    let _ = CONTROL.set(LogControl {
        filter: filter_handle,
        output: output_handle,
        configured: AtomicBool::new(false),
    });

    guard
}

/// Switch the installed subscriber to `options`, once per process.
///
/// Installs the subscriber when none exists yet. Returns `None` when an
/// earlier call already applied its settings or when a subscriber not
/// installed by [`init_logging`] owns the process.
pub fn configure_logging(options: LogOptions) -> Option<WorkerGuard> {
    let Some(control) = CONTROL.get() else {
        let guard = init_logging(options);
        if let Some(control) = CONTROL.get() {
            control.configured.store(true, Ordering::SeqCst);
        }
        return guard;
    };

    if control.configured.swap(true, Ordering::SeqCst) {
        return None;
    }

    let (layers, guard) = build_output(&options);
    if let Err(e) = control.output.reload(layers) {
        eprintln!("failed to switch log output: {}", e);
    }
    if let Err(e) = control.filter.reload(build_filter(options.level)) {
        eprintln!("failed to switch log level: {}", e);
    }

    guard
}

/// Initialize logging with default options.
///
/// # Examples
///
/// ```
/// use shared_utils::logging::init_default_logging;
///
/// let _guard = init_default_logging();
/// ```
pub fn init_default_logging() -> Option<WorkerGuard> {
    init_logging(LogOptions::default())
}

/// Apply the log settings of a client configuration, see [`configure_logging`].
///
/// # Examples
///
/// ```
/// use shared_utils::config::ClientCommonConfig;
/// use shared_utils::logging::init_logging_from_config;
///
/// let config = ClientCommonConfig::default();
/// let _guard = init_logging_from_config(&config);
/// ```
pub fn init_logging_from_config(config: &ClientCommonConfig) -> Option<WorkerGuard> {
    configure_logging(LogOptions::from_common(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_console_options() {
        let common = ClientCommonConfig {
            log_level: "debug".to_string(),
            disable_log_color: true,
            ..Default::default()
        };

        let options = LogOptions::from_common(&common);
        assert_eq!(options.level, Level::DEBUG);
        assert!(options.log_to_stdout);
        assert!(!options.log_to_file);
        assert!(!options.ansi);
        assert_eq!(options.max_log_files, 3);
    }

    #[test]
    fn test_file_options() {
        let common = ClientCommonConfig {
            log_file: "/var/log/tunnel/client.log".to_string(),
            log_max_days: 7,
            ..Default::default()
        };

        let options = LogOptions::from_common(&common);
        assert!(!options.log_to_stdout);
        assert!(options.log_to_file);
        assert_eq!(options.log_dir, "/var/log/tunnel");
        assert_eq!(options.log_file_name, "client.log");
        assert_eq!(options.max_log_files, 7);
    }

    #[test]
    fn test_bare_file_name_logs_to_current_dir() {
        let common = ClientCommonConfig {
            log_file: "client.log".to_string(),
            ..Default::default()
        };
        assert_eq!(LogOptions::from_common(&common).log_dir, ".");
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("nested");

        let options = LogOptions {
            log_to_file: true,
            log_dir: log_dir.to_str().unwrap().to_string(),
            log_file_name: "test.log".to_string(),
            ..Default::default()
        };

        assert!(file_appender(&options).is_some());
        assert!(fs::metadata(&log_dir).unwrap().is_dir());
    }

    #[test]
    fn test_unopenable_log_file_falls_back_to_stdout() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let options = LogOptions {
            log_to_stdout: false,
            log_to_file: true,
            log_dir: blocker.join("logs").display().to_string(),
            ..Default::default()
        };

        let (layers, guard) = build_output(&options);
        assert_eq!(layers.len(), 1);
        assert!(guard.is_none());
    }
}
