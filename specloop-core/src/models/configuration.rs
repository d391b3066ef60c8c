//! Configuration data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Logging verbosity configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum Verbosity {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Default approval inactivity timeout in seconds (0 = no timeout)
    pub default_approval_timeout_seconds: u32,
    /// Logging verbosity level
    pub log_level: Verbosity,
    /// Maximum number of context variables carried per run
    pub max_context_variables: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_approval_timeout_seconds: 300, // 5 minutes default
            log_level: Verbosity::Info,
            max_context_variables: 256,
        }
    }
}

impl OrchestratorConfig {
    /// Effective default approval timeout, None when disabled
    pub fn default_approval_timeout(&self) -> Option<Duration> {
        match self.default_approval_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    /// Load configuration from file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: OrchestratorConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(OrchestratorConfig::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("specloop").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.default_approval_timeout_seconds > 3600 {
            errors.push(
                "default_approval_timeout_seconds cannot exceed 3600 (1 hour)".to_string(),
            );
        }

        if self.max_context_variables == 0 {
            errors.push("max_context_variables must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_configuration() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.default_approval_timeout_seconds, 300);
        assert_eq!(
            config.default_approval_timeout(),
            Some(Duration::from_secs(300))
        );
        assert_eq!(config.log_level, Verbosity::Info);
    }

    #[test]
    fn test_zero_timeout_disables_approvals_deadline() {
        let config = OrchestratorConfig {
            default_approval_timeout_seconds: 0,
            ..OrchestratorConfig::default()
        };
        assert_eq!(config.default_approval_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configuration_validation() {
        let config = OrchestratorConfig {
            default_approval_timeout_seconds: 7200, // Invalid: too high
            max_context_variables: 0,               // Invalid: zero
            ..OrchestratorConfig::default()
        };

        let errors = config.validate().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.contains("default_approval_timeout_seconds")));
        assert!(errors.iter().any(|e| e.contains("max_context_variables")));
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let config = OrchestratorConfig {
            default_approval_timeout_seconds: 120,
            ..OrchestratorConfig::default()
        };

        // Save configuration
        config.save_to_file(&config_path).unwrap();
        assert!(config_path.exists());

        // Load configuration
        let loaded = OrchestratorConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.default_approval_timeout_seconds, 120);
    }
}
