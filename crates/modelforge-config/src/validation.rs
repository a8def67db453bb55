use modelforge_utils::error::ConfigError;
use modelforge_utils::types::Severity;

use super::BuildConfig;

impl BuildConfig {
    /// Validate configuration values, reporting every problem at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationFailed`] listing each invalid option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.fail_on == Severity::None {
            errors.push("fail_on: 'none' would never fail a build; use 'error' or lower".to_string());
        }

        if self.breadcrumb_separator.is_empty() {
            errors.push("breadcrumb_separator: must not be empty".to_string());
        }

        if self.max_depth == Some(0) {
            errors.push("max_depth: must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            let error_count = errors.len();
            Err(ConfigError::ValidationFailed {
                errors,
                error_count,
            })
        }
    }
}
