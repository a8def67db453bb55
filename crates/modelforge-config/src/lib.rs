//! Build configuration for modelforge
//!
//! Hierarchical configuration with precedence:
//! programmatic builder > environment > config file > defaults.
//!
//! The config file is TOML with a single `[build]` table:
//!
//! ```toml
//! [build]
//! fail_on = "error"
//! log_issues = true
//! strict_owner_matching = false
//! breadcrumb_separator = " > "
//! max_depth = 256
//! ```

mod builder;
mod discovery;
mod model;
mod validation;

pub use builder::BuildConfigBuilder;
pub use discovery::{ENV_CONFIG_PATH, ENV_FAIL_ON, ENV_LOG_ISSUES};
pub use model::{BuildConfig, ConfigSource, DEFAULT_BREADCRUMB_SEPARATOR};
