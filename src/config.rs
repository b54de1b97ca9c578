//! Engine configuration
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::FormulaResult;

/// Bounds applied to every sandboxed evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Longest accepted formula text, in bytes, after reference substitution
    pub max_expression_len: usize,
    /// Maximum nesting of the parsed expression, checked while parsing and
    /// again while evaluating
    pub max_depth: usize,
    /// Maximum number of AST nodes visited during one evaluation
    pub max_steps: usize,
    /// Longest text value the interpreter may build, in bytes
    pub max_text_len: usize,
    /// Wall-clock budget for one evaluation
    pub timeout_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_expression_len: 4096,
            max_depth: 128,
            max_steps: 10_000,
            max_text_len: 65_536,
            timeout_ms: 250,
        }
    }
}

impl SandboxLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: SandboxLimits,
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> FormulaResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_yaml_file(path: &Path) -> FormulaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_yaml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.limits.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_limits_override() {
        let config = EngineConfig::from_yaml_str("limits:\n  max_steps: 50\n").unwrap();
        assert_eq!(config.limits.max_steps, 50);
        assert_eq!(config.limits.max_depth, SandboxLimits::default().max_depth);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limits:\n  timeout_ms: 1000\n  max_text_len: 10").unwrap();

        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.limits.timeout_ms, 1000);
        assert_eq!(config.limits.max_text_len, 10);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::from_yaml_file(Path::new("does-not-exist.yaml")).unwrap_err();
        assert!(err.to_string().starts_with("IO error"));
    }
}
