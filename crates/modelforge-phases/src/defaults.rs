use anyhow::{Context, Result};
use tracing::trace;

use modelforge_model::ModelGraph;
use modelforge_phase_api::{BuildContext, ModelVisitor, Node};

/// Applies declared defaults to fields that are still empty.
#[derive(Debug, Clone, Default)]
pub struct DefaultPhase;

impl DefaultPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ModelVisitor for DefaultPhase {
    fn name(&self) -> &str {
        "apply-defaults"
    }

    fn visit(&self, _cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        let registry = graph.shared_registry();
        let type_name = graph.type_name(node.id)?.to_string();
        for field in registry.fields_of(&type_name) {
            let Some(default) = &field.default else {
                continue;
            };
            if !graph.get(node.id, &field.name)?.is_empty() {
                continue;
            }
            let value = default
                .resolve()
                .with_context(|| format!("Default provider for '{}' failed", field.name))?;
            trace!(path = %node.path, field = %field.name, "Applying default");
            graph.set(node.id, &field.name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use modelforge_config::BuildConfig;
    use modelforge_model::{FieldDescriptor, ModelType, TypeRegistry, Value};
    use modelforge_phase_api::PhaseRegistry;
    use modelforge_utils::error::BuildError;
    use modelforge_utils::types::Phase;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::builder()
                .register(
                    ModelType::new("Server")
                        .field(FieldDescriptor::scalar("port").default_value(8080))
                        .field(FieldDescriptor::scalar("host").default_with(|| Ok(Value::from("localhost"))))
                        .field(FieldDescriptor::scalar_list("tags").default_value(vec![Value::from("web")]))
                        .field(FieldDescriptor::scalar("broken").default_with(|| anyhow::bail!("no entropy"))),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_defaults_fill_only_empty_fields() {
        let mut graph = ModelGraph::new(registry());
        let server = graph.create("Server").unwrap();
        graph.set(server, "port", 9090).unwrap();
        graph.set(server, "broken", "set").unwrap();

        let mut phases = PhaseRegistry::new();
        phases.register_visitor(Phase::DEFAULT, DefaultPhase::new()).unwrap();
        let mut cx = BuildContext::new(Arc::new(phases), Arc::new(BuildConfig::default()));
        cx.enter(server);
        cx.execute_if_ready(&mut graph).unwrap();
        cx.leave().unwrap();

        assert_eq!(graph.get(server, "port").unwrap().as_i64(), Some(9090));
        assert_eq!(graph.get(server, "host").unwrap().as_str(), Some("localhost"));
        assert_eq!(graph.get(server, "tags").unwrap().as_list().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_failing_provider_is_a_driver_error() {
        let mut graph = ModelGraph::new(registry());
        let server = graph.create("Server").unwrap();

        let mut phases = PhaseRegistry::new();
        phases.register_visitor(Phase::DEFAULT, DefaultPhase::new()).unwrap();
        let mut cx = BuildContext::new(Arc::new(phases), Arc::new(BuildConfig::default()));
        cx.enter(server);
        let err = cx.execute_if_ready(&mut graph).unwrap_err();
        cx.leave().unwrap();

        assert_eq!(err.path(), Some("Server"));
        match err.into_cause() {
            BuildError::Driver { phase, action, source } => {
                assert_eq!(phase, "default");
                assert_eq!(action, "apply-defaults");
                assert!(source.to_string().contains("broken"));
            }
            other => panic!("expected driver error, got {other:?}"),
        }
    }
}
