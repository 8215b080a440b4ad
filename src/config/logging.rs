//! Environment and logging configuration

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use super::error::ValidationError;

/// Deployment environment
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info,billing_ledger=debug`
    #[serde(default = "default_level")]
    pub level: String,

    /// Force JSON output on or off; production defaults to JSON
    #[serde(default)]
    pub json: Option<bool>,
}

impl LoggingConfig {
    /// Whether log lines should be emitted as JSON
    pub fn use_json(&self, environment: Environment) -> bool {
        self.json
            .unwrap_or(environment == Environment::Production)
    }

    /// Builds the subscriber filter
    pub fn filter(&self) -> Result<EnvFilter, ValidationError> {
        EnvFilter::try_new(&self.level)
            .map_err(|_| ValidationError::InvalidLogLevel(self.level.clone()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.level.trim().is_empty() {
            return Err(ValidationError::MissingRequired("LOGGING__LEVEL"));
        }
        self.filter().map(|_| ())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_follows_environment() {
        let config = LoggingConfig::default();
        assert!(config.use_json(Environment::Production));
        assert!(!config.use_json(Environment::Development));
    }

    #[test]
    fn test_json_override() {
        let config = LoggingConfig {
            json: Some(false),
            ..Default::default()
        };
        assert!(!config.use_json(Environment::Production));
    }

    #[test]
    fn test_directive_validation() {
        let valid = LoggingConfig {
            level: "info,billing_ledger=debug".to_string(),
            json: None,
        };
        assert!(valid.validate().is_ok());

        let empty = LoggingConfig {
            level: "  ".to_string(),
            json: None,
        };
        assert_eq!(
            empty.validate(),
            Err(ValidationError::MissingRequired("LOGGING__LEVEL"))
        );
    }
}
