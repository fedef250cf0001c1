//! Configuration service: a key/value lookup with typed accessors over a
//! dotted path, backed by a TOML document.
//!
//! The full configuration service is an external collaborator in the
//! larger system; this is the minimal concrete implementation the node
//! binary needs to load its own settings.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use toml::Value;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("missing required config key {0}")]
    Missing(String),
    #[error("config key {key} is not of the expected type")]
    WrongType { key: String },
}

/// A parsed TOML document exposing Lichtenstein-style typed accessors
/// (`cfgGetBool`/`cfgGetNumber`/... in the original source) over dotted
/// paths such as `remote.server.address`.
pub struct Config {
    root: Value,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let root = text.parse::<Value>().map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    pub fn get_string(&self, path: &str, fallback: &str) -> String {
        self.lookup(path)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| fallback.to_owned())
    }

    pub fn get_string_required(&self, path: &str) -> Result<String, ConfigError> {
        self.lookup(path)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ConfigError::Missing(path.to_owned()))
    }

    pub fn get_bool(&self, path: &str, fallback: bool) -> bool {
        self.lookup(path).and_then(Value::as_bool).unwrap_or(fallback)
    }

    pub fn get_u64(&self, path: &str, fallback: u64) -> u64 {
        self.lookup(path)
            .and_then(Value::as_integer)
            .and_then(|i| u64::try_from(i).ok())
            .unwrap_or(fallback)
    }

    pub fn get_f64(&self, path: &str, fallback: f64) -> f64 {
        self.lookup(path).and_then(Value::as_float).unwrap_or(fallback)
    }

    /// Typed accessor for second-granularity durations (`remote.recv_timeout`).
    pub fn get_duration(&self, path: &str, fallback_secs: f64) -> Duration {
        Duration::from_secs_f64(self.get_f64(path, fallback_secs))
    }
}
