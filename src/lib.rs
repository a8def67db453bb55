//! modelforge: phased construction, linking and validation of model graphs
//!
//! A front end declares its model types once, as a [`TypeRegistry`] of
//! [`ModelType`]s whose [`FieldDescriptor`]s carry role tags (key, owner,
//! link, auto-create, default, validate). Objects live in a [`ModelGraph`]
//! arena. A [`Pipeline`] then completes a freshly created graph by running the
//! numbered lifecycle phases over everything reachable from a root:
//!
//! | # | Phase | What happens |
//! |---|-------|--------------|
//! | 0 | create | The front end creates and wires objects (not registrable) |
//! | 100 | auto-create | Empty auto-create fields are filled from their providers |
//! | 200 | owner | Contained objects get their owner back-references |
//! | 300 | link | Link fields are resolved from a provider object |
//! | 400 | default | Empty fields take their declared defaults |
//! | 500 | post-process | Type-level hooks run, supertype first |
//! | 600 | validate | Issues are collected over the whole graph, then aggregated |
//! | 700 | complete | Structural fields become read-only |
//!
//! Custom phases and actions can be added at any number; actions sharing a
//! number with a built-in phase run after it.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use modelforge::{FieldDescriptor, ModelGraph, ModelType, Pipeline, TypeRegistry};
//!
//! let types = TypeRegistry::builder()
//!     .register(
//!         ModelType::new("Cluster")
//!             .field(FieldDescriptor::mapping("servers", "Server")),
//!     )
//!     .register(
//!         ModelType::new("Server")
//!             .field(FieldDescriptor::scalar("name").key())
//!             .field(FieldDescriptor::single("cluster", "Cluster").owner())
//!             .field(FieldDescriptor::scalar("port").default_value(8080)),
//!     )
//!     .build()?;
//!
//! let mut graph = ModelGraph::new(Arc::new(types));
//! let cluster = graph.create("Cluster")?;
//! let alpha = graph.create_keyed("Server", "alpha")?;
//! graph.insert_keyed(cluster, "servers", alpha)?;
//!
//! let report = Pipeline::new()?.build(&mut graph, cluster)?;
//! assert_eq!(graph.get_object(alpha, "cluster")?, Some(cluster));
//! assert_eq!(graph.get(alpha, "port")?.as_i64(), Some(8080));
//! assert!(report.issues().is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Stable API
//!
//! The re-exports at the crate root are the supported surface. The member
//! crates are also reachable as modules ([`model`], [`phases`], ...) for
//! lower-level use, such as driving a [`BuildContext`] by hand.

// ============================================================================
// Pipeline
// ============================================================================

/// Built-in phases plus custom actions, shareable across threads.
///
/// See [`Pipeline::build`] for a one-shot build and [`Pipeline::build_in`]
/// for builds started from inside a running phase.
pub use modelforge_engine::{Pipeline, PipelineBuilder};

/// Per-build state passed explicitly to every action: nesting depth,
/// build-scoped actions, deferred callbacks, breadcrumbs and issues.
pub use modelforge_phase_api::BuildContext;

/// Extension points for custom phases.
pub use modelforge_phase_api::{FnAction, FnVisitor, ModelVisitor, Node, PhaseAction, VisitDecision};

/// Outcome of a successful build.
pub use modelforge_phase_api::{BuildReport, PhaseRun};

// ============================================================================
// Model declaration
// ============================================================================

pub use modelforge_model::{
    AutoCreateCluster, AutoCreateParams, AutoCreateSpec, FieldDescriptor, FieldKind, LinkSpec,
    LinkStrategy, ModelGraph, ModelType, ObjectValidator, OwnerHook, OwnerScope, TypeRegistry,
    ValidateSpec, Value,
};

// ============================================================================
// Shared types and errors
// ============================================================================

pub use modelforge_utils::error::{
    BuildError, ConfigError, ErrorCategory, LinkError, ModelError, PhaseError, SchemaError,
    UserFriendlyError,
};
pub use modelforge_utils::types::{ObjectId, Phase, Severity, ValidationIssue, ValidationReport};

/// Pipeline configuration with file and environment discovery.
pub use modelforge_config::{BuildConfig, BuildConfigBuilder};

/// Breadcrumb paths attached to log events and validation issues.
pub use modelforge_breadcrumb::{BreadcrumbTracker, Crumb};

// ============================================================================
// Member crates
// ============================================================================

pub use modelforge_breadcrumb as breadcrumb;
pub use modelforge_config as config;
pub use modelforge_model as model;
pub use modelforge_phase_api as phase_api;
pub use modelforge_phases as phases;
pub use modelforge_validation as validation;
pub use modelforge_visitor as visitor;

pub use modelforge_utils::logging;

/// Install the default `tracing` subscriber (`RUST_LOG` aware).
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init_tracing(verbose)
}
