use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, trace};

use modelforge_breadcrumb::{BreadcrumbTracker, Crumb};
use modelforge_config::BuildConfig;
use modelforge_model::ModelGraph;
use modelforge_utils::error::{BuildError, PhaseError};
use modelforge_utils::logging;
use modelforge_utils::types::{ObjectId, Phase, ValidationIssue, ValidationReport};
use modelforge_visitor::GraphWalker;

use crate::registry::{PhaseRegistry, RegisteredAction};
use crate::report::{BuildReport, PhaseRun};
use crate::{ModelVisitor, PhaseAction};

/// Callback scheduled with [`BuildContext::apply_later`].
pub type Deferred =
    Box<dyn FnOnce(&mut BuildContext, &mut ModelGraph) -> anyhow::Result<()> + Send>;

/// Name reported for deferred callbacks in driver errors.
const DEFERRED_ACTION: &str = "apply-later";

/// State of one build, owned by the caller and passed to every action.
///
/// A context is created per build (or per thread) from a shared base
/// registry. [`enter`](Self::enter) and [`leave`](Self::leave) maintain a
/// nesting counter; [`execute_if_ready`](Self::execute_if_ready) only runs
/// the phases for the outermost call, so objects built while a build is
/// already in progress do not re-run the pipeline. When the counter returns
/// to zero every piece of build-scoped state is released and the context can
/// be reused.
pub struct BuildContext {
    base: Arc<PhaseRegistry>,
    scoped: PhaseRegistry,
    deferred: BTreeMap<u32, Vec<Deferred>>,
    config: Arc<BuildConfig>,
    depth: usize,
    executing: bool,
    root: Option<ObjectId>,
    current: Option<Phase>,
    breadcrumbs: BreadcrumbTracker,
    issues: Vec<ValidationIssue>,
    runs: Vec<PhaseRun>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("depth", &self.depth)
            .field("executing", &self.executing)
            .field("root", &self.root)
            .field("current", &self.current)
            .field("base_phases", &self.base.len())
            .field("scoped_phases", &self.scoped.len())
            .field("deferred", &self.deferred.keys().collect::<Vec<_>>())
            .field("breadcrumb", &self.breadcrumbs.path())
            .field("issues", &self.issues.len())
            .finish_non_exhaustive()
    }
}

impl BuildContext {
    #[must_use]
    pub fn new(base: Arc<PhaseRegistry>, config: Arc<BuildConfig>) -> Self {
        let breadcrumbs = BreadcrumbTracker::new(config.breadcrumb_separator.clone());
        Self {
            base,
            scoped: PhaseRegistry::new(),
            deferred: BTreeMap::new(),
            config,
            depth: 0,
            executing: false,
            root: None,
            current: None,
            breadcrumbs,
            issues: Vec::new(),
            runs: Vec::new(),
        }
    }

    /// Start a build, or join the one in progress.
    ///
    /// The first call records `root` as the build root; nested calls only
    /// increment the counter.
    pub fn enter(&mut self, root: ObjectId) {
        if self.depth == 0 {
            debug!(root = %root, "Entering build");
            self.root = Some(root);
        } else {
            trace!(root = %root, depth = self.depth, "Joining build in progress");
        }
        self.depth += 1;
    }

    /// Leave the current nesting level, releasing all build-scoped state
    /// when the outermost level is left.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotEntered`] when no build is active.
    pub fn leave(&mut self) -> Result<(), PhaseError> {
        if self.depth == 0 {
            return Err(PhaseError::NotEntered);
        }
        self.depth -= 1;
        if self.depth == 0 {
            debug!(root = ?self.root, "Leaving build");
            self.clear();
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.scoped.clear();
        self.deferred.clear();
        self.root = None;
        self.current = None;
        self.executing = false;
        self.breadcrumbs.reset();
        self.issues.clear();
        self.runs.clear();
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing
    }

    #[must_use]
    pub fn root(&self) -> Option<ObjectId> {
        self.root
    }

    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Phase currently executing.
    #[must_use]
    pub fn current_phase(&self) -> Option<&Phase> {
        self.current.as_ref()
    }

    /// Register a whole-graph action for this build only.
    ///
    /// Actions registered while their phase is executing run at the end of
    /// that phase; actions for a phase that already ran are never executed.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn register<A>(&mut self, phase: Phase, action: A) -> Result<(), PhaseError>
    where
        A: PhaseAction + 'static,
    {
        self.scoped.register(phase, action)
    }

    /// Register a visitor for this build only.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn register_visitor<V>(&mut self, phase: Phase, visitor: V) -> Result<(), PhaseError>
    where
        V: ModelVisitor + 'static,
    {
        self.scoped.register_visitor(phase, visitor)
    }

    /// Run `callback` once, at the end of phase `number`.
    ///
    /// A number with no registered actions still gets its own step in the
    /// phase order. A number whose phase has already run is treated as "as
    /// soon as possible": the callback runs at the end of the phase that is
    /// currently executing.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::ReservedPhase`] for phase `0`.
    pub fn apply_later<F>(&mut self, number: u32, callback: F) -> Result<(), PhaseError>
    where
        F: FnOnce(&mut BuildContext, &mut ModelGraph) -> anyhow::Result<()> + Send + 'static,
    {
        if number == Phase::CREATE.number() {
            return Err(PhaseError::ReservedPhase { number });
        }
        self.deferred
            .entry(number)
            .or_default()
            .push(Box::new(callback));
        Ok(())
    }

    #[must_use]
    pub fn breadcrumbs(&self) -> &BreadcrumbTracker {
        &self.breadcrumbs
    }

    pub fn breadcrumbs_mut(&mut self) -> &mut BreadcrumbTracker {
        &mut self.breadcrumbs
    }

    /// Rendered breadcrumb path of the object being processed.
    #[must_use]
    pub fn breadcrumb_path(&self) -> String {
        self.breadcrumbs.path()
    }

    /// Record a validation issue, stamping it with the current breadcrumb.
    pub fn record_issue(&mut self, issue: ValidationIssue) {
        let issue = if issue.breadcrumb.is_none() && self.breadcrumbs.depth() > 0 {
            issue.with_breadcrumb(self.breadcrumbs.path())
        } else {
            issue
        };
        if self.config.log_issues {
            logging::log_issue(&issue);
        }
        self.issues.push(issue);
    }

    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Issues collected so far, judged against the configured threshold.
    #[must_use]
    pub fn validation_report(&self) -> ValidationReport {
        ValidationReport::from_issues(self.issues.clone(), self.config.fail_on)
    }

    /// Run every phase in ascending order, but only for the outermost build.
    ///
    /// Returns `Ok(None)` when called from a nested level or while phases are
    /// already executing.
    ///
    /// # Errors
    ///
    /// The first failing action stops the build. Engine errors it raised are
    /// returned unchanged; anything else is wrapped in [`BuildError::Driver`].
    pub fn execute_if_ready(
        &mut self,
        graph: &mut ModelGraph,
    ) -> Result<Option<BuildReport>, BuildError> {
        if self.depth != 1 || self.executing {
            trace!(
                depth = self.depth,
                executing = self.executing,
                "Phase execution deferred to the outermost build"
            );
            return Ok(None);
        }
        let root = self.root.ok_or(PhaseError::NotEntered)?;

        self.executing = true;
        let result = self.run_phases(graph, root);
        self.executing = false;
        self.current = None;
        result.map(Some)
    }

    fn run_phases(&mut self, graph: &mut ModelGraph, root: ObjectId) -> Result<BuildReport, BuildError> {
        let root_type = graph.type_name(root)?.to_string();
        let span = logging::build_span(root, &root_type);
        let _guard = span.enter();

        let started_at = Utc::now();
        let timer = Instant::now();
        logging::log_build_start(root, &root_type, self.phase_count());
        self.runs.clear();

        let mut cursor = None;
        while let Some(number) = self.next_phase(cursor) {
            cursor = Some(number);
            let phase = self.phase_for(number);
            if let Err(err) = self.run_phase(graph, &phase) {
                logging::log_build_error(root, &phase, &err);
                return Err(err);
            }
        }

        let validation = self.validation_report();
        let duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);
        logging::log_build_complete(root, u128::from(duration_ms), validation.worst());

        Ok(BuildReport {
            root,
            phases: std::mem::take(&mut self.runs),
            validation,
            started_at,
            duration_ms,
        })
    }

    fn phase_count(&self) -> usize {
        self.base
            .phases()
            .chain(self.scoped.phases())
            .map(Phase::number)
            .chain(self.deferred.keys().copied())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn next_phase(&self, cursor: Option<u32>) -> Option<u32> {
        let deferred = match cursor {
            None => self.deferred.keys().next().copied(),
            Some(n) => self.deferred.keys().find(|k| **k > n).copied(),
        };
        [
            self.base.next_after(cursor),
            self.scoped.next_after(cursor),
            deferred,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn phase_for(&self, number: u32) -> Phase {
        self.base
            .phase(number)
            .or_else(|| self.scoped.phase(number))
            .cloned()
            .unwrap_or_else(|| {
                Phase::new(
                    number,
                    Phase::builtin_name(number).unwrap_or(DEFERRED_ACTION),
                )
            })
    }

    fn run_phase(&mut self, graph: &mut ModelGraph, phase: &Phase) -> Result<(), BuildError> {
        let span = logging::phase_span(phase);
        let _guard = span.enter();
        self.current = Some(phase.clone());

        let timer = Instant::now();
        let number = phase.number();
        let mut visited = 0;
        let mut actions = 0;

        let base = Arc::clone(&self.base);
        for action in base.actions(number) {
            visited += self.run_action(graph, phase, action)?;
            actions += 1;
        }
        // Re-read on every step: scoped actions may register more scoped actions.
        let mut index = 0;
        while let Some(action) = self.scoped.actions(number).get(index).cloned() {
            index += 1;
            visited += self.run_action(graph, phase, &action)?;
            actions += 1;
        }

        self.drain_deferred(graph, phase)?;

        let duration_ms = timer.elapsed().as_millis();
        logging::log_phase_complete(phase, visited, duration_ms);
        self.runs.push(PhaseRun {
            phase: phase.clone(),
            actions,
            visited,
            duration_ms: u64::try_from(duration_ms).unwrap_or(u64::MAX),
        });
        Ok(())
    }

    fn run_action(
        &mut self,
        graph: &mut ModelGraph,
        phase: &Phase,
        action: &RegisteredAction,
    ) -> Result<usize, BuildError> {
        debug!(phase = %phase.name(), action = action.name(), "Running phase action");
        let outcome = match action {
            RegisteredAction::Global(global) => global.run(self, graph).map(|()| 0),
            RegisteredAction::Visiting(visitor) => self.run_visitor(graph, phase, visitor.as_ref()),
        };
        outcome.map_err(|err| {
            debug!(error = %err, "Phase action failed");
            BuildError::from_action(phase.name(), action.name(), err)
        })
    }

    /// Walk the graph from the root, wrapping each visit in a breadcrumb
    /// segment nested under the segments of its visited ancestors.
    fn run_visitor(
        &mut self,
        graph: &mut ModelGraph,
        phase: &Phase,
        visitor: &dyn ModelVisitor,
    ) -> anyhow::Result<usize> {
        let root = self.root.ok_or(PhaseError::NotEntered)?;
        let walker = GraphWalker::new().max_depth(self.config.max_depth);
        let phase_depth = self.breadcrumbs.depth() + 1;
        self.breadcrumbs.push(Crumb::new(phase.name()));

        let mut trail: Vec<ObjectId> = Vec::new();
        let walked = walker.walk(
            graph,
            root,
            |graph, node| visitor.should_visit(graph, node),
            |graph, node| {
                while let Some(top) = trail.last() {
                    if node.ancestors.contains(top) {
                        break;
                    }
                    trail.pop();
                    self.breadcrumbs.leave();
                }
                let mut crumb = Crumb::new(graph.type_name(node.id)?);
                if let Some(name) = node.instance_name() {
                    crumb = crumb.qualifier(name);
                }
                self.breadcrumbs.push(crumb);
                trail.push(node.id);
                visitor.visit(self, graph, node).map_err(|err| {
                    BuildError::from_action(phase.name(), visitor.name(), err)
                        .at(&node.path, self.breadcrumbs.path())
                        .into()
                })
            },
        );

        let result = walked.and_then(|stats| {
            while self.breadcrumbs.depth() > phase_depth {
                self.breadcrumbs.leave();
            }
            visitor.finish(self, graph)?;
            Ok(stats.visited)
        });
        while self.breadcrumbs.depth() >= phase_depth {
            self.breadcrumbs.leave();
        }
        result
    }

    fn drain_deferred(&mut self, graph: &mut ModelGraph, phase: &Phase) -> Result<(), BuildError> {
        loop {
            let Some(number) = self
                .deferred
                .range(..=phase.number())
                .next()
                .map(|(number, _)| *number)
            else {
                return Ok(());
            };
            let callbacks = self.deferred.remove(&number).unwrap_or_default();
            trace!(phase = %phase.name(), scheduled_for = number, count = callbacks.len(), "Running deferred callbacks");
            for callback in callbacks {
                callback(self, graph)
                    .map_err(|err| BuildError::from_action(phase.name(), DEFERRED_ACTION, err))?;
            }
        }
    }
}
