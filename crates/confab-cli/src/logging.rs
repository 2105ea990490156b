use std::fs;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CONFAB_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to a file under the cache dir; the terminal belongs to the UI.
    File,
    Stderr,
}

pub fn log_file_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("confab").join("confab.log"))
}

/// Installs the global subscriber. `CONFAB_LOG` overrides the configured
/// filter. Returns the log file path when logging to a file.
pub fn init(
    target: LogTarget,
    default_filter: &str,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init()
                .map_err(|err| err.to_string())?;
            Ok(None)
        }
        LogTarget::File => {
            let Some(path) = log_file_path() else {
                return Ok(None);
            };
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
                .map_err(|err| err.to_string())?;
            Ok(Some(path))
        }
    }
}
