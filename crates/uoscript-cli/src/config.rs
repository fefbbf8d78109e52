//! Persistent runner defaults.
//!
//! The runner reads `~/.uoscript/config.json` for fallback values.
//! Command-line flags and environment variables always win over the
//! file; the file only supplies defaults for runs that do not specify
//! them. Nothing in the CLI writes the file, so it is read-only from
//! this side: users create it by hand.

use std::path::PathBuf;

use serde::Deserialize;

const CONFIG_FILENAME: &str = "config.json";

fn uoscript_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".uoscript")
}

/// Fallback values for the `run` subcommand.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunnerConfig {
    /// Milliseconds to sleep between engine ticks.
    #[serde(default)]
    pub tick_ms: Option<u64>,

    /// Abort a run after this many ticks.
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

impl RunnerConfig {
    /// Read the defaults file, if there is one.
    ///
    /// A missing or malformed file is not an error; every field just
    /// stays unset and the command line decides.
    pub fn load() -> Self {
        let path = uoscript_dir().join(CONFIG_FILENAME);
        match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        let config = RunnerConfig::default();
        assert!(config.tick_ms.is_none());
        assert!(config.max_ticks.is_none());
    }

    #[test]
    fn deserialize_full_config() {
        let loaded: RunnerConfig =
            serde_json::from_str(r#"{"tick_ms":25,"max_ticks":1000}"#).unwrap();
        assert_eq!(loaded.tick_ms, Some(25));
        assert_eq!(loaded.max_ticks, Some(1000));
    }

    #[test]
    fn deserialize_empty_json() {
        let loaded: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert!(loaded.tick_ms.is_none());
        assert!(loaded.max_ticks.is_none());
    }
}
