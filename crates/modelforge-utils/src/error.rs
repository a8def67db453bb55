use std::fmt;
use thiserror::Error;

use crate::types::{ObjectId, ValidationReport};

/// Library-level error type returned by every build operation.
///
/// # Error Categories
///
/// | Category | Variant | Propagation |
/// |----------|---------|-------------|
/// | Schema | [`Schema`](Self::Schema) | aborts immediately |
/// | Link | [`Link`](Self::Link) | aborts immediately |
/// | Model | [`Model`](Self::Model) | aborts immediately |
/// | Phase | [`Phase`](Self::Phase) | aborts immediately |
/// | Configuration | [`Config`](Self::Config) | raised before a build starts |
/// | Validation | [`ValidationFailed`](Self::ValidationFailed) | deferred until the whole graph is validated |
/// | Driver | [`Driver`](Self::Driver) | wraps any other failure of a phase action |
///
/// Only validation issues are collected instead of thrown. Everything else
/// stops the remaining phases of the build. Failures raised while visiting an
/// object arrive wrapped in [`At`](Self::At), naming that object; use
/// [`cause`](Self::cause) to match on the underlying error.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Link resolution error: {0}")]
    Link(#[from] LinkError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationReport),

    #[error("Phase {phase} action '{action}' failed: {source}")]
    Driver {
        phase: String,
        action: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("{source} (at {path}; {breadcrumb})")]
    At {
        /// Containment path of the failing object, e.g. `Root.svcs[2]`.
        path: String,
        breadcrumb: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    /// Convert an action failure into a `BuildError`.
    ///
    /// Engine errors raised inside the action (directly or through a nested
    /// build) are passed through unchanged; anything else is wrapped in
    /// [`BuildError::Driver`] with the original kept as the source.
    #[must_use]
    pub fn from_action(phase: &str, action: &str, err: anyhow::Error) -> Self {
        let err = match err.downcast::<BuildError>() {
            Ok(build) => return build,
            Err(other) => other,
        };
        let err = match err.downcast::<SchemaError>() {
            Ok(schema) => return Self::Schema(schema),
            Err(other) => other,
        };
        let err = match err.downcast::<LinkError>() {
            Ok(link) => return Self::Link(link),
            Err(other) => other,
        };
        let err = match err.downcast::<ModelError>() {
            Ok(model) => return Self::Model(model),
            Err(other) => other,
        };
        let err = match err.downcast::<PhaseError>() {
            Ok(phase_err) => return Self::Phase(phase_err),
            Err(other) => other,
        };
        Self::Driver {
            phase: phase.to_string(),
            action: action.to_string(),
            source: err.into(),
        }
    }

    /// Attach the location of the object being processed. An error that
    /// already names its object keeps the innermost location.
    #[must_use]
    pub fn at(self, path: impl Into<String>, breadcrumb: impl Into<String>) -> Self {
        match self {
            located @ Self::At { .. } => located,
            other => Self::At {
                path: path.into(),
                breadcrumb: breadcrumb.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error without its location.
    #[must_use]
    pub fn cause(&self) -> &Self {
        match self {
            Self::At { source, .. } => source.cause(),
            other => other,
        }
    }

    #[must_use]
    pub fn into_cause(self) -> Self {
        match self {
            Self::At { source, .. } => (*source).into_cause(),
            other => other,
        }
    }

    /// Containment path of the object that failed, when known.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::At { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The validation report carried by a validation failure.
    #[must_use]
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self.cause() {
            Self::ValidationFailed(report) => Some(report),
            _ => None,
        }
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Schema,
    Link,
    Model,
    PhaseExecution,
    Configuration,
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema => write!(f, "Schema"),
            Self::Link => write!(f, "Link Resolution"),
            Self::Model => write!(f, "Model"),
            Self::PhaseExecution => write!(f, "Phase Execution"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Validation => write!(f, "Validation"),
        }
    }
}

impl UserFriendlyError for BuildError {
    fn user_message(&self) -> String {
        match self {
            Self::ValidationFailed(report) => {
                let failing = report.failures().count();
                format!(
                    "The model has {failing} problem(s) that must be fixed ({} issue(s) in total)",
                    report.len()
                )
            }
            Self::Driver { phase, action, .. } => {
                format!("The '{action}' step of the {phase} phase failed unexpectedly")
            }
            Self::At { path, source, .. } => format!("{} (while processing {path})", source.user_message()),
            other => other.to_string(),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Schema(_) => vec![
                "Check the field descriptors registered for the types named in the error"
                    .to_string(),
                "Key and owner roles must be declared consistently across a type hierarchy"
                    .to_string(),
            ],
            Self::Link(LinkError::AmbiguousLink { .. }) => vec![
                "Declare a link strategy (instance-name or field-name) on the link field"
                    .to_string(),
                "Or name the target field explicitly".to_string(),
            ],
            Self::Link(_) => vec![
                "Name the provider or target field explicitly on the link field".to_string(),
            ],
            Self::Model(ModelError::Frozen { .. }) => vec![
                "Structural fields cannot change after the complete phase; mutate before building"
                    .to_string(),
            ],
            Self::Model(_) => vec!["Check the field kinds used by the failing operation".to_string()],
            Self::Phase(PhaseError::ReservedPhase { .. }) => vec![
                "Register custom actions at a phase number of 1 or higher".to_string(),
            ],
            Self::Phase(_) => vec!["Balance every enter() with exactly one leave()".to_string()],
            Self::Config(_) => vec![
                "Review the configuration file and MODELFORGE_* environment variables".to_string(),
            ],
            Self::ValidationFailed(report) => report
                .failures()
                .map(|issue| format!("Fix {}: {}", issue.path, issue.message))
                .collect(),
            Self::Driver { .. } => vec![
                "Inspect the source error; providers and hooks must not panic or fail".to_string(),
            ],
            Self::At { source, .. } => source.suggestions(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Schema(_) => ErrorCategory::Schema,
            Self::Link(_) => ErrorCategory::Link,
            Self::Model(_) => ErrorCategory::Model,
            Self::Phase(_) | Self::Driver { .. } => ErrorCategory::PhaseExecution,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::ValidationFailed(_) => ErrorCategory::Validation,
            Self::At { source, .. } => source.category(),
        }
    }
}

/// Structural misconfiguration of model types, detected at registration or build time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown model type '{name}'")]
    UnknownType { name: String },

    #[error("Type '{type_name}' extends unknown type '{supertype}'")]
    UnknownSupertype { type_name: String, supertype: String },

    #[error("Type '{type_name}' is part of a supertype cycle")]
    SupertypeCycle { type_name: String },

    #[error("Type '{type_name}' is registered twice")]
    DuplicateType { type_name: String },

    #[error("Field '{field}' is declared more than once in the hierarchy of '{type_name}'")]
    DuplicateField { type_name: String, field: String },

    #[error("Field '{type_name}.{field}' declares unknown type '{declared}'")]
    UnknownDeclaredType {
        type_name: String,
        field: String,
        declared: String,
    },

    #[error("Type '{type_name}' has more than one key field: {}", .fields.join(", "))]
    MultipleKeys { type_name: String, fields: Vec<String> },

    #[error(
        "Hierarchy '{hierarchy}' mixes keyed types ({}) with unkeyed types ({})",
        .keyed.join(", "),
        .unkeyed.join(", ")
    )]
    InconsistentKeys {
        hierarchy: String,
        keyed: Vec<String>,
        unkeyed: Vec<String>,
    },

    #[error("Field '{type_name}.{field}' has an invalid role: {reason}")]
    InvalidRole {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("Type '{type_name}' is abstract and cannot be instantiated")]
    AbstractInstantiation { type_name: String },

    #[error(
        "Auto-create field '{type_name}.{field}' declares abstract type '{declared}' without a concrete type"
    )]
    AbstractAutoCreate {
        type_name: String,
        field: String,
        declared: String,
    },

    #[error("Auto-create type '{concrete}' for '{type_name}.{field}' is not a concrete subtype of '{declared}'")]
    AutoCreateTypeMismatch {
        type_name: String,
        field: String,
        concrete: String,
        declared: String,
    },

    #[error("Type '{type_name}' is keyed; construction requires a key")]
    KeyRequired { type_name: String },

    #[error("Type '{type_name}' is not keyed; construction must not supply a key")]
    UnexpectedKey { type_name: String },

    #[error("Type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error(
        "Container type '{container_type}' matches several unset owner fields of '{type_name}': {}",
        .fields.join(", ")
    )]
    AmbiguousOwner {
        type_name: String,
        container_type: String,
        fields: Vec<String>,
    },
}

/// Failures resolving a link field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Link '{type_name}.{field}' has no provider: '{type_name}' declares no owner field")]
    NoOwnerField { type_name: String, field: String },

    #[error(
        "Link '{type_name}.{field}' has an ambiguous provider: owner fields {} need explicit disambiguation",
        .owners.join(", ")
    )]
    AmbiguousOwner {
        type_name: String,
        field: String,
        owners: Vec<String>,
    },

    #[error("Link '{type_name}.{field}' names owner field '{owner_field}' which does not exist")]
    UnknownOwnerField {
        type_name: String,
        field: String,
        owner_field: String,
    },

    #[error("Link '{link}' targets field '{target}' which provider type '{provider_type}' does not have")]
    UnknownTargetField {
        link: String,
        provider_type: String,
        target: String,
    },

    #[error(
        "Link '{link}' expects exactly one field tagged '{tag}' on '{provider_type}', found {}",
        .candidates.len()
    )]
    TagMismatch {
        link: String,
        provider_type: String,
        tag: String,
        candidates: Vec<String>,
    },

    #[error(
        "Ambiguous link '{link}': provider '{provider_type}' matches instance name '{instance_match}' and field name '{field_match}'; declare a link strategy"
    )]
    AmbiguousLink {
        link: String,
        provider_type: String,
        instance_match: String,
        field_match: String,
    },

    #[error("Link '{link}' found no field on '{provider_type}' assignable to '{declared}'")]
    NoAssignableField {
        link: String,
        provider_type: String,
        declared: String,
    },

    #[error(
        "Link '{link}' found several fields on '{provider_type}' assignable to '{declared}': {}",
        .candidates.join(", ")
    )]
    AmbiguousAssignable {
        link: String,
        provider_type: String,
        declared: String,
        candidates: Vec<String>,
    },

    #[error("Link '{link}' resolved to a value of type '{found}', expected '{expected}'")]
    TypeMismatch {
        link: String,
        expected: String,
        found: String,
    },
}

/// Misuse of graph operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Object {id} does not exist in this graph")]
    UnknownObject { id: ObjectId },

    #[error("Type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("Field '{type_name}.{field}' is not {expected}")]
    KindMismatch {
        type_name: String,
        field: String,
        expected: &'static str,
    },

    #[error("Field '{type_name}.{field}' expects '{expected}', got '{found}'")]
    TypeMismatch {
        type_name: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("Field '{type_name}.{field}' is structural and the object is complete")]
    Frozen { type_name: String, field: String },

    #[error("Key field '{type_name}.{field}' is already set")]
    KeyReassigned { type_name: String, field: String },

    #[error("Owner field '{type_name}.{field}' is already assigned")]
    OwnerReassigned { type_name: String, field: String },

    #[error("Type '{type_name}' has no key field")]
    UnkeyedType { type_name: String },

    #[error("Object of type '{type_name}' has no key value")]
    MissingKey { type_name: String },

    #[error("Mapping '{type_name}.{field}' already contains key '{key}'")]
    DuplicateKey {
        type_name: String,
        field: String,
        key: String,
    },
}

/// Misuse of the phase registry or the build nesting protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    #[error("Phase number {number} is reserved for object creation")]
    ReservedPhase { number: u32 },

    #[error("leave() called without a matching enter()")]
    NotEntered,

    #[error("Traversal exceeded the maximum depth of {max_depth} at '{path}'")]
    DepthLimitExceeded { path: String, max_depth: usize },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
