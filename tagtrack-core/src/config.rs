use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagtrack_activity::SourceType;

use crate::error::ConfigError;
use crate::tags::DEFAULT_DELIMITER;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Name the tracker reports itself under. Events are sourced from their
    /// logger unless an `app` annotation names one.
    pub source_name: Option<String>,
    pub source_type: SourceType,
    /// Category of snapshots built from user-defined fields
    pub snapshot_category: String,
    /// Events an activity may hold before it is force-closed
    pub max_activity_size: usize,
    pub metrics_on_exception: bool,
    /// Seconds between metrics snapshots
    pub metrics_frequency: u64,
    pub delimiter: char,
    /// Use the annotation-free text as the default event message
    pub strip_annotations: bool,
    /// Treat fields of enclosing spans as annotations
    pub span_annotations: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_name: None,
            source_type: SourceType::Appl,
            snapshot_category: "Tracing".to_string(),
            max_activity_size: 100,
            metrics_on_exception: true,
            metrics_frequency: 60,
            delimiter: DEFAULT_DELIMITER,
            strip_annotations: false,
            span_annotations: true,
        }
    }
}

impl TryFrom<serde_json::Value> for Config {
    type Error = ConfigError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        let config: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_activity_size == 0 {
            return Err(ConfigError::Invalid(
                "max_activity_size must be greater than 0".to_string(),
            ));
        }
        if self.delimiter.is_whitespace() || self.delimiter.is_alphanumeric() {
            return Err(ConfigError::Invalid(format!(
                "delimiter '{}' must be a punctuation character",
                self.delimiter
            )));
        }
        Ok(())
    }

    pub fn metrics_frequency(&self) -> Duration {
        Duration::from_secs(self.metrics_frequency)
    }

    /// Source name, falling back to `default` when none is configured.
    pub fn source_name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.source_name.as_deref().unwrap_or(default)
    }
}
