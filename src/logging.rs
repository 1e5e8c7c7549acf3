//! Logging configuration and initialization.
//!
//! Provides file-based logging with rotation and optional stderr output.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Guard that must be held for the lifetime of the application.
/// When dropped, flushes any pending log writes.
#[must_use = "Dropping this guard will stop logging - keep it alive for the program's lifetime"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    _stderr_guard: Option<WorkerGuard>,
}

/// Initialize the logging subsystem based on configuration.
///
/// Returns a guard that must be kept alive for the duration of the
/// program; dropping it flushes pending log writes.
pub fn init_logging(config: &LoggingConfig, project_root: &Path) -> Result<LoggingGuard> {
    let mut file_guard = None;
    let mut stderr_guard = None;
    let mut layers: Vec<FmtLayer> = Vec::new();

    if config.enabled {
        let (file_layer, guard) = build_file_layer(config, project_root)?;
        file_guard = Some(guard);
        layers.push(file_layer);
    }
    if config.stderr {
        let (stderr_layer, guard) = build_stderr_layer();
        stderr_guard = Some(guard);
        layers.push(stderr_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to initialize logging subscriber")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        _stderr_guard: stderr_guard,
    })
}

type FmtLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn build_file_layer(config: &LoggingConfig, project_root: &Path) -> Result<(FmtLayer, WorkerGuard)> {
    let log_dir = resolve_log_dir(&config.directory, project_root);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let rotation = parse_rotation(&config.rotation);
    let file_appender = RollingFileAppender::new(rotation, &log_dir, &config.file_prefix);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(parse_level(&config.level))
        .boxed();

    Ok((layer, guard))
}

fn build_stderr_layer() -> (FmtLayer, WorkerGuard) {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repograph=info"));
    let (non_blocking_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());

    let layer = fmt::layer()
        .with_writer(non_blocking_stderr)
        .with_target(false)
        .with_filter(stderr_filter)
        .boxed();

    (layer, guard)
}

fn resolve_log_dir(directory: &Path, project_root: &Path) -> std::path::PathBuf {
    if directory.is_absolute() {
        directory.to_path_buf()
    } else {
        project_root.join(directory)
    }
}

fn parse_level(level: &str) -> EnvFilter {
    let level_lower = level.to_lowercase();
    let level_str = match level_lower.as_str() {
        "trace" => "repograph=trace",
        "debug" => "repograph=debug",
        "info" => "repograph=info",
        "warn" => "repograph=warn",
        "error" => "repograph=error",
        _ => {
            eprintln!(
                "Warning: Unknown log level '{}', defaulting to 'info'",
                level
            );
            "repograph=info"
        }
    };
    EnvFilter::new(level_str)
}

fn parse_rotation(rotation: &str) -> Rotation {
    let rotation_lower = rotation.to_lowercase();
    match rotation_lower.as_str() {
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => {
            eprintln!(
                "Warning: Unknown rotation strategy '{}', defaulting to 'daily'",
                rotation
            );
            Rotation::DAILY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        let filter = parse_level("debug");
        assert!(filter.to_string().contains("debug"));

        let filter = parse_level("TRACE");
        assert!(filter.to_string().contains("trace"));

        // Invalid level should default to info
        let filter = parse_level("invalid");
        assert!(filter.to_string().contains("info"));
    }

    #[test]
    fn test_parse_rotation() {
        // Rotation doesn't implement PartialEq, just verify no panic
        let _ = parse_rotation("daily");
        let _ = parse_rotation("hourly");
        let _ = parse_rotation("never");
        let _ = parse_rotation("invalid");
    }

    #[test]
    fn test_resolve_log_dir_relative() {
        let project_root = Path::new("/home/user/project");
        let relative_dir = Path::new(".repograph/logs");

        let resolved = resolve_log_dir(relative_dir, project_root);
        assert_eq!(resolved, Path::new("/home/user/project/.repograph/logs"));
    }

    #[test]
    fn test_resolve_log_dir_absolute() {
        let project_root = Path::new("/home/user/project");
        let absolute_dir = Path::new("/var/log/repograph");

        let resolved = resolve_log_dir(absolute_dir, project_root);
        assert_eq!(resolved, Path::new("/var/log/repograph"));
    }
}
