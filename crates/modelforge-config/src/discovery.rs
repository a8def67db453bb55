use std::env;
use std::path::Path;

use tracing::debug;

use modelforge_utils::error::ConfigError;
use modelforge_utils::types::Severity;

use super::model::ConfigFile;
use super::{BuildConfig, ConfigSource};

/// Path of a TOML config file to load during discovery
pub const ENV_CONFIG_PATH: &str = "MODELFORGE_CONFIG";
/// Overrides `fail_on`
pub const ENV_FAIL_ON: &str = "MODELFORGE_FAIL_ON";
/// Overrides `log_issues` (`true`/`false`/`1`/`0`)
pub const ENV_LOG_ISSUES: &str = "MODELFORGE_LOG_ISSUES";

impl BuildConfig {
    /// Parse a TOML document on top of the defaults and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFile`] for malformed TOML or unknown keys,
    /// and [`ConfigError::ValidationFailed`] for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when the file does not exist, plus
    /// everything [`from_toml_str`](Self::from_toml_str) can return.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Discover configuration from the environment.
    ///
    /// Loads the file named by `MODELFORGE_CONFIG` when set, then applies
    /// `MODELFORGE_FAIL_ON` and `MODELFORGE_LOG_ISSUES` on top.
    ///
    /// # Errors
    ///
    /// Fails when the named file is missing or invalid, or when an
    /// environment override cannot be parsed.
    pub fn discover() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = env::var(ENV_CONFIG_PATH)
            && !path.is_empty()
        {
            debug!(path = %path, "Loading build configuration file");
            config.merge_file(Path::new(&path))?;
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        self.merge_toml(&content)
    }

    fn merge_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        file.build.apply_to(self, ConfigSource::File);
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(ENV_FAIL_ON)
            && !value.is_empty()
        {
            self.fail_on = value
                .parse::<Severity>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_FAIL_ON.to_string(),
                    value,
                })?;
            self.source_attribution
                .insert("fail_on".to_string(), ConfigSource::Env);
        }

        if let Ok(value) = env::var(ENV_LOG_ISSUES)
            && !value.is_empty()
        {
            self.log_issues = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_LOG_ISSUES.to_string(),
                        value,
                    });
                }
            };
            self.source_attribution
                .insert("log_issues".to_string(), ConfigSource::Env);
        }

        Ok(())
    }
}
