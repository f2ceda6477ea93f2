//! Engine configuration.
//!
//! Configuration comes from an optional JSON file, then environment
//! overrides. Missing fields fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::verifier::runtime::{PythonConfig, PythonMode, SandboxConfig};
use crate::verifier::MatchPolicy;

/// Environment variable overriding the timeout
pub const ENV_TIMEOUT_MS: &str = "LABRUN_TIMEOUT_MS";
/// Environment variable overriding the match policy
pub const ENV_MATCH: &str = "LABRUN_MATCH";
/// Environment variable naming a Python interpreter (enables subprocess mode)
pub const ENV_PYTHON: &str = "LABRUN_PYTHON";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid JSON for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Limits shared by every executor
    pub sandbox: SandboxConfig,
    /// Test output comparison policy
    pub matching: MatchPolicy,
    /// Python executor settings
    pub python: PythonConfig,
}

impl EngineConfig {
    /// Parse configuration from JSON text
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded config from {}", path.display());
        Self::from_json_str(&text)
    }

    /// Default config file location (`<config dir>/labrun/config.json`)
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("labrun").join("config.json"))
    }

    /// Load an explicit file, else the default file if present, else defaults
    ///
    /// # Errors
    /// Returns error if a file exists but is invalid
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// Returns error if an override has an invalid value
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    ///
    /// # Errors
    /// Returns error if an override has an invalid value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.sandbox.timeout_ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_TIMEOUT_MS}={raw}")))?;
        }
        if let Some(raw) = lookup(ENV_MATCH) {
            self.matching = raw.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(raw) = lookup(ENV_PYTHON).filter(|p| !p.trim().is_empty()) {
            self.python.mode = PythonMode::Subprocess;
            self.python.interpreter = Some(PathBuf::from(raw.trim()));
        }
        self.validate()
    }

    /// Reject limits that would make every run fail
    ///
    /// # Errors
    /// Returns error on a zero timeout or size limit
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.timeout_ms == 0 {
            return Err(ConfigError::Invalid("sandbox.timeout_ms must be > 0".into()));
        }
        if self.sandbox.max_code_bytes == 0 {
            return Err(ConfigError::Invalid("sandbox.max_code_bytes must be > 0".into()));
        }
        if self.sandbox.max_output_bytes == 0 {
            return Err(ConfigError::Invalid("sandbox.max_output_bytes must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sandbox.timeout_ms, 5000);
        assert_eq!(config.matching, MatchPolicy::TrimEnd);
        assert_eq!(config.python.mode, PythonMode::Demo);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"sandbox": {"timeout_ms": 250}, "matching": "exact"}"#,
        )
        .unwrap();
        assert_eq!(config.sandbox.timeout_ms, 250);
        assert_eq!(config.sandbox.max_code_bytes, 64 * 1024);
        assert_eq!(config.matching, MatchPolicy::Exact);
    }

    #[test]
    fn test_python_section() {
        let config = EngineConfig::from_json_str(
            r#"{"python": {"mode": "subprocess", "interpreter": "/usr/bin/python3"}}"#,
        )
        .unwrap();
        assert_eq!(config.python.mode, PythonMode::Subprocess);
        assert_eq!(config.python.interpreter, Some(PathBuf::from("/usr/bin/python3")));
        assert!(config.python.allowed_imports.contains(&"math".to_string()));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = EngineConfig::from_json_str(r#"{"sandbox": {"timeout_ms": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = EngineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TIMEOUT_MS, "1500"),
            (ENV_MATCH, "exact"),
            (ENV_PYTHON, "/opt/python/bin/python3"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.sandbox.timeout_ms, 1500);
        assert_eq!(config.matching, MatchPolicy::Exact);
        assert_eq!(config.python.mode, PythonMode::Subprocess);
    }

    #[test]
    fn test_bad_override() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("LABRUN_TIMEOUT_MS=soon"));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/labrun.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
