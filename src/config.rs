//! Persistent workspace configuration (`config.json`).
//!
//! Keys are addressed in dot notation from the command line, e.g.
//! `review.maxIterations`. Missing keys in the file fall back to defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub memory: MemoryConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReviewConfig {
    pub enabled: bool,
    pub max_iterations: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    MemoryEnabled,
    ReviewEnabled,
    ReviewMaxIterations,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [
        Self::MemoryEnabled,
        Self::ReviewEnabled,
        Self::ReviewMaxIterations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryEnabled => "memory.enabled",
            Self::ReviewEnabled => "review.enabled",
            Self::ReviewMaxIterations => "review.maxIterations",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| {
                Error::Invalid(format!(
                    "unknown config key '{}'. Known keys: memory.enabled, review.enabled, review.maxIterations",
                    s
                ))
            })
    }
}

impl Config {
    pub fn get(&self, key: ConfigKey) -> Value {
        match key {
            ConfigKey::MemoryEnabled => Value::Bool(self.memory.enabled),
            ConfigKey::ReviewEnabled => Value::Bool(self.review.enabled),
            ConfigKey::ReviewMaxIterations => Value::from(self.review.max_iterations),
        }
    }

    /// Set a key from its textual form, validating the value.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::MemoryEnabled => self.memory.enabled = parse_bool(key, value)?,
            ConfigKey::ReviewEnabled => self.review.enabled = parse_bool(key, value)?,
            ConfigKey::ReviewMaxIterations => {
                let n: u32 = value.trim().parse().map_err(|_| {
                    Error::Invalid(format!("{key} must be a positive integer, got '{value}'"))
                })?;
                if n == 0 {
                    return Err(Error::Invalid(format!("{key} must be at least 1")));
                }
                self.review.max_iterations = n;
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<(ConfigKey, Value)> {
        ConfigKey::ALL.into_iter().map(|k| (k, self.get(k))).collect()
    }

    /// Values read from disk are not trusted to respect `set` validation.
    pub(crate) fn normalized(mut self) -> Self {
        if self.review.max_iterations == 0 {
            tracing::warn!("review.maxIterations of 0 in config.json, using 1");
            self.review.max_iterations = 1;
        }
        self
    }
}

fn parse_bool(key: ConfigKey, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::Invalid(format!(
            "{key} must be true or false, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config: Config = serde_json::from_str(r#"{"review": {"enabled": true}}"#).unwrap();
        assert!(config.review.enabled);
        assert_eq!(config.review.max_iterations, 3);
        assert!(!config.memory.enabled);
    }

    #[test]
    fn uses_camel_case_on_disk() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["review"]["maxIterations"], 3);
    }

    #[test]
    fn sets_and_gets_by_dotted_key() {
        let mut config = Config::default();
        config.set("review.maxIterations".parse().unwrap(), "5").unwrap();
        config.set(ConfigKey::MemoryEnabled, "true").unwrap();
        assert_eq!(config.get(ConfigKey::ReviewMaxIterations), Value::from(5));
        assert_eq!(config.get(ConfigKey::MemoryEnabled), Value::Bool(true));
    }

    #[test]
    fn rejects_bad_values_and_keys() {
        let mut config = Config::default();
        assert!(config.set(ConfigKey::ReviewMaxIterations, "0").is_err());
        assert!(config.set(ConfigKey::ReviewMaxIterations, "many").is_err());
        assert!(config.set(ConfigKey::ReviewEnabled, "maybe").is_err());
        assert!("review.colour".parse::<ConfigKey>().is_err());
        assert_eq!(config, Config::default());
    }
}
