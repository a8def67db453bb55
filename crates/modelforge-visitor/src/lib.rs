//! Depth-first traversal of a model graph along containment edges
//!
//! [`GraphWalker::walk`] visits every object reachable from a root exactly
//! once, in pre-order: fields in declaration order (supertype fields first),
//! collection elements by index, mapping entries in insertion order. Owner
//! and link fields are not containment and are never followed, and an
//! identity-based visited set makes shared or cyclic references safe.
//!
//! Children are read after the visit callback returns, so objects created
//! by the callback (auto-create) are visited in the same walk.

use std::collections::HashSet;

use anyhow::Result;
use tracing::trace;

use modelforge_model::{Edge, ModelGraph};
use modelforge_utils::error::PhaseError;
use modelforge_utils::types::ObjectId;

/// Per-node decision of a `should_visit` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitDecision {
    /// Handle this node and descend into its children.
    #[default]
    Visit,
    /// Skip this node but still descend into its children.
    Descend,
    /// Skip this node and its whole subtree.
    Prune,
}

/// An object reached during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: ObjectId,
    /// Root type name followed by `.field`, `.field[3]` or `.field[key]` segments.
    pub path: String,
    pub parent: Option<ObjectId>,
    /// Edge through which the node was reached; `None` for the root.
    pub edge: Option<Edge>,
    /// Containment chain from the root down to the parent.
    pub ancestors: Vec<ObjectId>,
    pub depth: usize,
}

impl Node {
    fn root(graph: &ModelGraph, id: ObjectId) -> Result<Self> {
        Ok(Self {
            id,
            path: graph.type_name(id)?.to_string(),
            parent: None,
            edge: None,
            ancestors: Vec::new(),
            depth: 0,
        })
    }

    fn child(&self, edge: Edge) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.id);
        Self {
            id: edge.target,
            path: format!("{}{}", self.path, edge.path_segment()),
            parent: Some(self.id),
            edge: Some(edge),
            ancestors,
            depth: self.depth + 1,
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Name by which the parent holds this node (field name or mapping key).
    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        self.edge.as_ref().and_then(Edge::instance_name)
    }

    /// Containment chain nearest-first, starting with the parent.
    pub fn nearest_ancestors(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.ancestors.iter().rev().copied()
    }

    /// The build root this node was reached from.
    #[must_use]
    pub fn root_id(&self) -> ObjectId {
        self.ancestors.first().copied().unwrap_or(self.id)
    }
}

/// Counters from one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Nodes handed to the visit callback.
    pub visited: usize,
    /// Nodes reached but skipped by the predicate.
    pub skipped: usize,
}

/// Depth-first walker with an optional depth guard.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphWalker {
    max_depth: Option<usize>,
}

impl GraphWalker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`PhaseError::DepthLimitExceeded`] when a node deeper than
    /// `max_depth` is reached.
    #[must_use]
    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk from `root`, calling `visit` for each node `should_visit` accepts.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by `visit`, and fails when the root
    /// is not in the graph or the depth guard trips.
    pub fn walk<S, V>(
        &self,
        graph: &mut ModelGraph,
        root: ObjectId,
        mut should_visit: S,
        mut visit: V,
    ) -> Result<WalkStats>
    where
        S: FnMut(&ModelGraph, &Node) -> VisitDecision,
        V: FnMut(&mut ModelGraph, &Node) -> Result<()>,
    {
        let mut stats = WalkStats::default();
        let mut seen = HashSet::new();
        let mut stack = vec![Node::root(graph, root)?];

        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                continue;
            }
            if let Some(max_depth) = self.max_depth
                && node.depth > max_depth
            {
                return Err(PhaseError::DepthLimitExceeded {
                    path: node.path,
                    max_depth,
                }
                .into());
            }

            match should_visit(graph, &node) {
                VisitDecision::Prune => {
                    stats.skipped += 1;
                    continue;
                }
                VisitDecision::Descend => stats.skipped += 1,
                VisitDecision::Visit => {
                    trace!(path = %node.path, id = %node.id, "Visiting node");
                    visit(graph, &node)?;
                    stats.visited += 1;
                }
            }

            let children = graph.children(node.id)?;
            for edge in children.into_iter().rev() {
                if !seen.contains(&edge.target) {
                    stack.push(node.child(edge));
                }
            }
        }

        Ok(stats)
    }

    /// Walk with the default predicate, visiting every reachable object.
    ///
    /// # Errors
    ///
    /// See [`walk`](Self::walk).
    pub fn walk_all<V>(&self, graph: &mut ModelGraph, root: ObjectId, visit: V) -> Result<WalkStats>
    where
        V: FnMut(&mut ModelGraph, &Node) -> Result<()>,
    {
        self.walk(graph, root, |_, _| VisitDecision::Visit, visit)
    }

    /// Reachable nodes in visiting order, without mutating the graph.
    ///
    /// # Errors
    ///
    /// See [`walk`](Self::walk).
    pub fn nodes(&self, graph: &ModelGraph, root: ObjectId) -> Result<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut stack = vec![Node::root(graph, root)?];
        let mut nodes = Vec::new();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                continue;
            }
            if let Some(max_depth) = self.max_depth
                && node.depth > max_depth
            {
                return Err(PhaseError::DepthLimitExceeded {
                    path: node.path,
                    max_depth,
                }
                .into());
            }
            for edge in graph.children(node.id)?.into_iter().rev() {
                if !seen.contains(&edge.target) {
                    stack.push(node.child(edge));
                }
            }
            nodes.push(node);
        }
        Ok(nodes)
    }
}
