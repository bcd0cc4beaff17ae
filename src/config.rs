//! Driver configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STATEHOLD_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use statehold_core::Address;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address that deploys and owns the engine.
    pub owner: Address,
    /// Operator for definitions that do not name one. Falls back to the owner.
    pub operator: Option<Address>,
    pub output: OutputFormat,
    /// Base directory for relative definition paths.
    pub definitions_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: Address::derive(b"statehold:owner"),
            operator: None,
            output: OutputFormat::Pretty,
            definitions_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or STATEHOLD_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("STATEHOLD_CONFIG") {
                Ok(path) => Self::from_file(path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(owner) = std::env::var("STATEHOLD_OWNER") {
            match owner.parse() {
                Ok(parsed) => self.owner = parsed,
                Err(e) => tracing::warn!("ignoring STATEHOLD_OWNER: {}", e),
            }
        }

        if let Ok(operator) = std::env::var("STATEHOLD_OPERATOR") {
            match operator.parse() {
                Ok(parsed) => self.operator = Some(parsed),
                Err(e) => tracing::warn!("ignoring STATEHOLD_OPERATOR: {}", e),
            }
        }

        if let Ok(output) = std::env::var("STATEHOLD_OUTPUT") {
            match output.parse() {
                Ok(parsed) => self.output = parsed,
                Err(e) => tracing::warn!("ignoring STATEHOLD_OUTPUT: {}", e),
            }
        }

        if let Ok(dir) = std::env::var("STATEHOLD_DEFINITIONS_DIR") {
            self.definitions_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner.is_zero() {
            return Err(ConfigError::ValidationError(
                "owner must not be the zero address".to_string(),
            ));
        }
        if self.operator.is_some_and(|op| op.is_zero()) {
            return Err(ConfigError::ValidationError(
                "operator must not be the zero address".to_string(),
            ));
        }
        Ok(())
    }

    /// The operator assigned to definitions that omit one.
    pub fn default_operator(&self) -> Address {
        self.operator.unwrap_or(self.owner)
    }

    /// Resolves a definition path against `definitions_dir`.
    pub fn definition_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.definitions_dir.join(path)
        }
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Configuration or definition file error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.owner.is_zero());
        assert_eq!(config.default_operator(), config.owner);
        assert_eq!(config.output, OutputFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config {
            operator: Some(Address::derive(b"operator")),
            output: OutputFormat::Json,
            ..Config::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.owner, config.owner);
        assert_eq!(parsed.operator, config.operator);
        assert_eq!(parsed.output, OutputFormat::Json);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statehold.yaml");
        std::fs::write(&path, "output: json\ndefinitions_dir: /srv/machines\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.owner, Config::default().owner);
        assert_eq!(
            config.definition_path(Path::new("door.json")),
            PathBuf::from("/srv/machines/door.json")
        );
        assert_eq!(
            config.definition_path(Path::new("/tmp/door.json")),
            PathBuf::from("/tmp/door.json")
        );
    }

    #[test]
    fn test_zero_owner_rejected() {
        let config = Config {
            owner: Address::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.yaml");
        Config::default().save(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.owner, Config::default().owner);

        assert!(matches!(
            Config::from_file(dir.path().join("missing.yaml")),
            Err(ConfigError::IoError(..))
        ));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
