use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::state::StageTiming;
use super::state::UiTheme;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub timing: TimingConfig,
    pub ui: UiConfig,
    pub replies: ReplyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub progress_delay_ms: u64,
    pub completion_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            progress_delay_ms: 1_500,
            completion_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    pub theme: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: UiTheme::Classic.label().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ReplyConfig {
    /// JSON file of canned replies. Unset means the built-in simulated reply.
    pub fixtures: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.theme()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Missing file means defaults; a present but broken file is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn stage_timing(&self) -> StageTiming {
        StageTiming {
            progress_delay: Duration::from_millis(self.timing.progress_delay_ms),
            completion_delay: Duration::from_millis(self.timing.completion_delay_ms),
        }
    }

    pub fn theme(&self) -> Result<UiTheme, ConfigError> {
        UiTheme::parse(&self.ui.theme).ok_or_else(|| ConfigError::UnknownTheme(self.ui.theme.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_file_yields_stock_timing() {
        let config = Config::from_toml_str("").expect("empty config parses");
        assert_eq!(config.stage_timing(), StageTiming::default());
        assert_eq!(config.theme().expect("theme"), UiTheme::Classic);
        assert_eq!(config.replies.fixtures, None);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml_str(
            "[timing]\nprogress_delay_ms = 10\n\n[ui]\ntheme = \"dusk\"\n",
        )
        .expect("config parses");
        assert_eq!(config.timing.progress_delay_ms, 10);
        assert_eq!(config.timing.completion_delay_ms, 2_000);
        assert_eq!(config.theme().expect("theme"), UiTheme::Dusk);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn unknown_theme_is_rejected() {
        let err = Config::from_toml_str("[ui]\ntheme = \"neon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTheme(name) if name == "neon"));
    }

    #[test]
    fn load_or_default_handles_missing_and_present_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        assert_eq!(
            Config::load_or_default(&path).expect("defaults"),
            Config::default()
        );

        fs::write(&path, "[replies]\nfixtures = \"replies.json\"\n").expect("write config");
        let config = Config::load_or_default(&path).expect("loads");
        assert_eq!(config.replies.fixtures.as_deref(), Some("replies.json"));

        fs::write(&path, "[timing\n").expect("write broken config");
        assert!(matches!(
            Config::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
