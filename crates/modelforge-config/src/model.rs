use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use modelforge_utils::types::Severity;

/// Default separator between rendered breadcrumb segments
pub const DEFAULT_BREADCRUMB_SEPARATOR: &str = " > ";

/// Source of a configuration value.
///
/// Serializes to lowercase strings: `"programmatic"`, `"env"`, `"file"`, `"default"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Programmatic,
    Env,
    File,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Programmatic => write!(f, "programmatic"),
            Self::Env => write!(f, "env"),
            Self::File => write!(f, "file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Effective configuration of a build pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildConfig {
    /// Validation issues at or above this severity fail the build.
    pub fail_on: Severity,
    /// Log every validation issue as it is recorded.
    pub log_issues: bool,
    /// Treat a container matching several unset owner fields as a schema error
    /// instead of assigning the first declared one.
    pub strict_owner_matching: bool,
    /// Separator used when rendering breadcrumb paths.
    pub breadcrumb_separator: String,
    /// Optional limit on traversal depth.
    pub max_depth: Option<usize>,
    /// Where each value came from, keyed by option name.
    #[serde(skip)]
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            fail_on: Severity::Error,
            log_issues: true,
            strict_owner_matching: false,
            breadcrumb_separator: DEFAULT_BREADCRUMB_SEPARATOR.to_string(),
            max_depth: None,
            source_attribution: HashMap::new(),
        }
    }
}

impl BuildConfig {
    /// Where the named option came from (`Default` when never overridden).
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }
}

/// On-disk shape of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigFile {
    #[serde(default)]
    pub build: BuildSection,
}

/// `[build]` table; every key optional so the file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct BuildSection {
    pub fail_on: Option<Severity>,
    pub log_issues: Option<bool>,
    pub strict_owner_matching: Option<bool>,
    pub breadcrumb_separator: Option<String>,
    pub max_depth: Option<usize>,
}

impl BuildSection {
    /// Overlay the values present in this section onto `config`.
    pub(crate) fn apply_to(self, config: &mut BuildConfig, source: ConfigSource) {
        let attribution = &mut config.source_attribution;
        if let Some(fail_on) = self.fail_on {
            config.fail_on = fail_on;
            attribution.insert("fail_on".to_string(), source);
        }
        if let Some(log_issues) = self.log_issues {
            config.log_issues = log_issues;
            attribution.insert("log_issues".to_string(), source);
        }
        if let Some(strict) = self.strict_owner_matching {
            config.strict_owner_matching = strict;
            attribution.insert("strict_owner_matching".to_string(), source);
        }
        if let Some(separator) = self.breadcrumb_separator {
            config.breadcrumb_separator = separator;
            attribution.insert("breadcrumb_separator".to_string(), source);
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = Some(max_depth);
            attribution.insert("max_depth".to_string(), source);
        }
    }
}
