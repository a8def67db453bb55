//! Phase action contract for modelforge builds
//!
//! This crate is the shared contract between the pipeline and the phase
//! implementations:
//!
//! - [`PhaseAction`]: a step that runs once per phase over the whole graph.
//! - [`ModelVisitor`]: a step that runs once per reachable object, driven by
//!   the graph walker.
//! - [`PhaseRegistry`]: actions keyed by phase number.
//! - [`BuildContext`]: the per-build state (nesting counter, deferred
//!   callbacks, breadcrumbs, collected issues) passed explicitly to every
//!   action instead of living in thread-local storage.

mod context;
mod registry;
mod report;

pub use context::{BuildContext, Deferred};
pub use registry::{PhaseRegistry, RegisteredAction};
pub use report::{BuildReport, PhaseRun};

pub use modelforge_visitor::{Node, VisitDecision};

use anyhow::Result;

use modelforge_model::ModelGraph;

/// A step bound to a phase that handles the whole graph at once.
pub trait PhaseAction: Send + Sync {
    /// Name used in logs and driver errors.
    fn name(&self) -> &str;

    /// Run the step. The build root is available as [`BuildContext::root`].
    fn run(&self, cx: &mut BuildContext, graph: &mut ModelGraph) -> Result<()>;
}

/// A step bound to a phase that handles each reachable object in turn.
///
/// The driver walks the graph depth-first from the build root, wraps every
/// visit in a breadcrumb segment, and calls [`finish`](Self::finish) once the
/// walk is over.
pub trait ModelVisitor: Send + Sync {
    /// Name used in logs and driver errors.
    fn name(&self) -> &str;

    /// Per-node decision; the default handles every object.
    fn should_visit(&self, _graph: &ModelGraph, _node: &Node) -> VisitDecision {
        VisitDecision::Visit
    }

    fn visit(&self, cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()>;

    /// Called after the walk, e.g. to aggregate what the visits collected.
    fn finish(&self, _cx: &mut BuildContext, _graph: &mut ModelGraph) -> Result<()> {
        Ok(())
    }
}

/// Adapter turning a closure into a [`PhaseAction`].
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&mut BuildContext, &mut ModelGraph) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> PhaseAction for FnAction<F>
where
    F: Fn(&mut BuildContext, &mut ModelGraph) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, cx: &mut BuildContext, graph: &mut ModelGraph) -> Result<()> {
        (self.f)(cx, graph)
    }
}

/// Adapter turning a per-node closure into a [`ModelVisitor`].
pub struct FnVisitor<F> {
    name: String,
    f: F,
}

impl<F> FnVisitor<F>
where
    F: Fn(&mut BuildContext, &mut ModelGraph, &Node) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> ModelVisitor for FnVisitor<F>
where
    F: Fn(&mut BuildContext, &mut ModelGraph, &Node) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn visit(&self, cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        (self.f)(cx, graph, node)
    }
}
