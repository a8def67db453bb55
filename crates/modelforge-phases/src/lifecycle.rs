//! Post-processing and completion

use anyhow::Result;
use tracing::trace;

use modelforge_model::ModelGraph;
use modelforge_phase_api::{BuildContext, ModelVisitor, Node};

/// Runs the post-process hooks of each object's type, supertype hooks first.
#[derive(Debug, Clone, Default)]
pub struct PostProcessPhase;

impl PostProcessPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ModelVisitor for PostProcessPhase {
    fn name(&self) -> &str {
        "post-process"
    }

    fn visit(&self, _cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        let registry = graph.shared_registry();
        let type_name = graph.type_name(node.id)?.to_string();
        for model_type in registry.lineage(&type_name) {
            for hook in &model_type.post_process {
                trace!(path = %node.path, level = %model_type.name, "Running post-process hook");
                hook(graph, node.id)?;
            }
        }
        Ok(())
    }
}

/// Marks every reachable object complete, making its structural fields
/// read-only.
#[derive(Debug, Clone, Default)]
pub struct CompletePhase;

impl CompletePhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ModelVisitor for CompletePhase {
    fn name(&self) -> &str {
        "complete"
    }

    fn visit(&self, _cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        graph.freeze(node.id)?;
        Ok(())
    }
}
