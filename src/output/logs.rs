use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

pub const ENV_LOG: &str = "LCE_LOG";
pub const ENV_LOG_DIR: &str = "LCE_LOG_DIR";
const LOG_FILE: &str = "lce-reports.log";

/// Where the debug log lives: `LCE_LOG_DIR`, or `logs/` under the platform
/// data directory.
pub fn log_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(ENV_LOG_DIR).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let project_dirs = ProjectDirs::from("com", "LCReports", "LCReportDownloader")
        .context("missing project directories")?;
    Ok(project_dirs.data_dir().join("logs"))
}

pub fn log_file_path() -> Result<PathBuf> {
    Ok(log_dir()?.join(LOG_FILE))
}

fn console_level(verbose: bool) -> LevelFilter {
    let configured = std::env::var(ENV_LOG)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);
    if verbose {
        configured.max(LevelFilter::DEBUG)
    } else {
        configured
    }
}

fn open_log_file() -> Result<(File, PathBuf)> {
    let path = log_file_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create log dir {parent:?}"))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {path:?}"))?;
    Ok((file, path))
}

/// Installs the console layer on stderr and, when the log directory is
/// writable, a debug-level file layer. Returns the log file path if one is
/// in use.
pub fn setup_logging(verbose: bool) -> Option<PathBuf> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_level(verbose));

    let (file_layer, path, file_error) = match open_log_file() {
        Ok((file, path)) => {
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(path), None)
        }
        Err(error) => (None, None, Some(error)),
    };

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    if let Some(error) = file_error {
        tracing::warn!("file logging disabled: {error:#}");
    }
    if let Some(path) = &path {
        tracing::debug!("logging to {}", path.display());
    }
    path
}
