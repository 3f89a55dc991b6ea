use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "RAGCHAT_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// The TUI owns the terminal, so logs go to a file
    File,
    Stderr,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("ragchat"))
}

fn open_log_file(dir: &Path) -> Result<(File, PathBuf)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let path = dir.join("ragchat.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    Ok((file, path))
}

/// Install the global subscriber. Returns the log file path when logging to
/// a file. If the file can't be opened, TUI logs are dropped.
pub fn init(target: LogTarget) -> Result<Option<PathBuf>> {
    match target {
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(filter())
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow!("installing logger: {}", e))?;
            Ok(None)
        }
        LogTarget::File => {
            let opened = default_log_dir()
                .ok_or_else(|| anyhow!("Could not determine data directory"))
                .and_then(|dir| open_log_file(&dir));

            match opened {
                Ok((file, path)) => {
                    tracing_subscriber::registry()
                        .with(filter())
                        .with(
                            fmt::layer()
                                .with_target(true)
                                .with_ansi(false)
                                .with_writer(Mutex::new(file)),
                        )
                        .try_init()
                        .map_err(|e| anyhow!("installing logger: {}", e))?;
                    Ok(Some(path))
                }
                Err(_) => {
                    tracing_subscriber::registry()
                        .with(filter())
                        .with(fmt::layer().with_writer(std::io::sink))
                        .try_init()
                        .map_err(|e| anyhow!("installing logger: {}", e))?;
                    Ok(None)
                }
            }
        }
    }
}
