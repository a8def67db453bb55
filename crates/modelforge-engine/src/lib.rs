//! Pipeline assembly for modelforge builds
//!
//! A [`Pipeline`] is the immutable, shareable part of a build: the base
//! phase registry (built-in phases plus any custom actions) and the build
//! configuration. Every build gets its own [`BuildContext`] from
//! [`Pipeline::begin`], so one pipeline can serve any number of threads.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use modelforge_engine::Pipeline;
//! use modelforge_model::{FieldDescriptor, ModelGraph, ModelType, TypeRegistry};
//!
//! let registry = TypeRegistry::builder()
//!     .register(ModelType::new("A").field(FieldDescriptor::single("b", "B")))
//!     .register(ModelType::new("B").field(FieldDescriptor::single("owner", "A").owner()))
//!     .build()?;
//! let mut graph = ModelGraph::new(Arc::new(registry));
//! let a = graph.create("A")?;
//! let b = graph.create("B")?;
//! graph.set(a, "b", b)?;
//!
//! let report = Pipeline::new()?.build(&mut graph, a)?;
//! assert_eq!(graph.get_object(b, "owner")?, Some(a));
//! assert!(report.issues().is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;

use tracing::debug;

use modelforge_config::BuildConfig;
use modelforge_model::ModelGraph;
use modelforge_phase_api::{BuildContext, BuildReport, ModelVisitor, PhaseAction, PhaseRegistry};
use modelforge_utils::error::{BuildError, PhaseError};
use modelforge_utils::types::{ObjectId, Phase};
use modelforge_validation::ValidationPhase;

/// The built-in phases plus custom actions, with the configuration every
/// build runs under.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<PhaseRegistry>,
    config: Arc<BuildConfig>,
}

impl Pipeline {
    /// Pipeline with the built-in phases and the default configuration.
    ///
    /// # Errors
    ///
    /// See [`PipelineBuilder::build`].
    pub fn new() -> Result<Self, BuildError> {
        Self::builder().build()
    }

    /// Pipeline with the built-in phases and configuration discovered from
    /// the environment (`MODELFORGE_CONFIG`, `MODELFORGE_FAIL_ON`,
    /// `MODELFORGE_LOG_ISSUES`).
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] when discovery fails.
    pub fn from_env() -> Result<Self, BuildError> {
        Self::builder().config(BuildConfig::discover()?).build()
    }

    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    /// A fresh context for one build (or one thread's sequence of builds).
    #[must_use]
    pub fn begin(&self) -> BuildContext {
        BuildContext::new(Arc::clone(&self.registry), Arc::clone(&self.config))
    }

    /// Run a complete build of `root`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a phase, or
    /// [`BuildError::ValidationFailed`] carrying every collected issue.
    pub fn build(&self, graph: &mut ModelGraph, root: ObjectId) -> Result<BuildReport, BuildError> {
        let mut cx = self.begin();
        self.build_in(&mut cx, graph, root)?
            .ok_or_else(|| PhaseError::NotEntered.into())
    }

    /// Build `root` inside `cx`: enter, execute if this is the outermost
    /// level, and always leave.
    ///
    /// Returns `None` when called while `cx` is already building, e.g. from
    /// a phase action creating further objects; those objects are then
    /// handled by the build in progress.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_in(
        &self,
        cx: &mut BuildContext,
        graph: &mut ModelGraph,
        root: ObjectId,
    ) -> Result<Option<BuildReport>, BuildError> {
        cx.enter(root);
        let result = cx.execute_if_ready(graph);
        cx.leave()?;
        result
    }
}

/// Assembles a [`Pipeline`].
#[derive(Debug)]
pub struct PipelineBuilder {
    config: Option<BuildConfig>,
    registry: PhaseRegistry,
    builtin: bool,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            registry: PhaseRegistry::new(),
            builtin: true,
        }
    }

    #[must_use]
    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leave out the built-in phases; only custom actions run.
    #[must_use]
    pub fn without_builtin(mut self) -> Self {
        self.builtin = false;
        self
    }

    /// Add a whole-graph action. Actions sharing a number with a built-in
    /// phase run after it.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn action<A>(mut self, phase: Phase, action: A) -> Result<Self, PhaseError>
    where
        A: PhaseAction + 'static,
    {
        self.registry.register(phase, action)?;
        Ok(self)
    }

    /// Add a per-object visitor.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn visitor<V>(mut self, phase: Phase, visitor: V) -> Result<Self, PhaseError>
    where
        V: ModelVisitor + 'static,
    {
        self.registry.register_visitor(phase, visitor)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns [`BuildError::Config`] when the configuration does not
    /// validate.
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut registry = PhaseRegistry::new();
        if self.builtin {
            modelforge_phases::register_builtin(&mut registry)?;
            registry.register_visitor(Phase::VALIDATE, ValidationPhase::new())?;
        }
        for phase in self.registry.phases() {
            for action in self.registry.actions(phase.number()) {
                registry.register_action(phase.clone(), action.clone())?;
            }
        }
        debug!(phases = registry.len(), builtin = self.builtin, "Assembled pipeline");

        Ok(Pipeline {
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }
}
