use modelforge_utils::error::ConfigError;
use modelforge_utils::types::Severity;

use super::{BuildConfig, ConfigSource};

impl BuildConfig {
    /// Create a builder for programmatic configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use modelforge_config::BuildConfig;
    /// use modelforge_utils::types::Severity;
    ///
    /// let config = BuildConfig::builder()
    ///     .fail_on(Severity::Warning)
    ///     .max_depth(128)
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.fail_on, Severity::Warning);
    /// ```
    #[must_use]
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::new()
    }
}

/// Builder for programmatic configuration.
///
/// Values set here win over environment and file values when layered with
/// [`BuildConfigBuilder::base`], and are attributed to
/// [`ConfigSource::Programmatic`].
#[derive(Debug, Clone, Default)]
pub struct BuildConfigBuilder {
    base: Option<BuildConfig>,
    fail_on: Option<Severity>,
    log_issues: Option<bool>,
    strict_owner_matching: Option<bool>,
    breadcrumb_separator: Option<String>,
    max_depth: Option<usize>,
}

impl BuildConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing (e.g. discovered) configuration instead of the defaults.
    #[must_use]
    pub fn base(mut self, config: BuildConfig) -> Self {
        self.base = Some(config);
        self
    }

    #[must_use]
    pub fn fail_on(mut self, severity: Severity) -> Self {
        self.fail_on = Some(severity);
        self
    }

    #[must_use]
    pub fn log_issues(mut self, enabled: bool) -> Self {
        self.log_issues = Some(enabled);
        self
    }

    #[must_use]
    pub fn strict_owner_matching(mut self, strict: bool) -> Self {
        self.strict_owner_matching = Some(strict);
        self
    }

    #[must_use]
    pub fn breadcrumb_separator(mut self, separator: impl Into<String>) -> Self {
        self.breadcrumb_separator = Some(separator.into());
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationFailed`] when a value is out of range.
    pub fn build(self) -> Result<BuildConfig, ConfigError> {
        let mut config = self.base.unwrap_or_default();
        let source = ConfigSource::Programmatic;

        if let Some(fail_on) = self.fail_on {
            config.fail_on = fail_on;
            config
                .source_attribution
                .insert("fail_on".to_string(), source);
        }
        if let Some(log_issues) = self.log_issues {
            config.log_issues = log_issues;
            config
                .source_attribution
                .insert("log_issues".to_string(), source);
        }
        if let Some(strict) = self.strict_owner_matching {
            config.strict_owner_matching = strict;
            config
                .source_attribution
                .insert("strict_owner_matching".to_string(), source);
        }
        if let Some(separator) = self.breadcrumb_separator {
            config.breadcrumb_separator = separator;
            config
                .source_attribution
                .insert("breadcrumb_separator".to_string(), source);
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = Some(max_depth);
            config
                .source_attribution
                .insert("max_depth".to_string(), source);
        }

        config.validate()?;
        Ok(config)
    }
}
