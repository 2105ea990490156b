use std::path::PathBuf;

use super::state::TurnId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown theme '{0}'")]
    UnknownTheme(String),
}

/// Why a submission did not start a turn. Both cases leave the state
/// untouched apart from an activity log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitRejection {
    #[error("message is empty")]
    Empty,
    #[error("turn {0} is still streaming")]
    TurnInFlight(TurnId),
}
