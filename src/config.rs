use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::watcher::WatchOptions;

/// Second plugin argument that turns on automatic reload.
pub const AUTOREFRESH_ARG: &str = "autorefresh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub path: PathBuf,
    pub autorefresh: bool,
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let watch = WatchOptions::default();
        Self {
            path: PathBuf::new(),
            autorefresh: false,
            settle_delay_ms: watch.settle_delay.as_millis() as u64,
            poll_interval_ms: watch.poll_interval.as_millis() as u64,
        }
    }
}

impl Config {
    /// Builds a config from plugin arguments: `<path> [autorefresh]`.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let (path, rest) = match args {
            [] => {
                return Err(Error::InvalidConfig(
                    "need a lease file path as first argument".to_string(),
                ));
            }
            [path, rest @ ..] => (path.as_ref(), rest),
        };

        let autorefresh = match rest {
            [] => false,
            [flag] if flag.as_ref() == AUTOREFRESH_ARG => true,
            [flag] => {
                return Err(Error::InvalidConfig(format!(
                    "unknown argument '{}' (expected '{}')",
                    flag.as_ref(),
                    AUTOREFRESH_ARG
                )));
            }
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "expected at most 2 arguments, got {}",
                    args.len()
                )));
            }
        };

        let config = Self {
            path: PathBuf::from(path),
            autorefresh,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "lease file path must not be empty".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
