pub mod error;
pub mod logging;
pub mod types;

pub use error::{BuildError, ConfigError, LinkError, ModelError, PhaseError, SchemaError};
pub use types::{ObjectId, Phase, Severity, ValidationIssue, ValidationReport};
