//! Owner phase: back-references from contained objects to their containers

use anyhow::Result;
use tracing::{debug, trace};

use modelforge_model::{ModelGraph, OwnerScope};
use modelforge_phase_api::{BuildContext, ModelVisitor, Node};
use modelforge_utils::error::SchemaError;
use modelforge_utils::types::ObjectId;

/// A direct owner slot: a field or a single-argument hook.
enum Slot {
    Field(String),
    Hook(String),
}

impl Slot {
    fn name(&self) -> &str {
        match self {
            Self::Field(name) | Self::Hook(name) => name,
        }
    }
}

/// Assigns owner fields and fires owner hooks.
///
/// For an object reached from container `C`:
/// - the first unset direct owner field (or unfired hook) whose declared
///   type `C` satisfies receives `C`, unless a direct owner field already
///   points at `C`;
/// - every unset transitive owner field receives the nearest ancestor of
///   its declared type;
/// - every unset root owner field receives the build root when the root is
///   of the declared type.
///
/// Assigned owners are never overwritten.
#[derive(Debug, Clone, Default)]
pub struct OwnerPhase;

impl OwnerPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn assign_direct(
        cx: &BuildContext,
        graph: &mut ModelGraph,
        id: ObjectId,
        container: ObjectId,
    ) -> Result<()> {
        let registry = graph.shared_registry();
        let type_name = graph.type_name(id)?.to_string();

        let mut slots = Vec::new();
        for field in registry.owner_fields(&type_name) {
            if field.owner != Some(OwnerScope::Direct) {
                continue;
            }
            let current = graph.get_object(id, &field.name)?;
            if current == Some(container) {
                trace!(object = %graph.describe(id), field = %field.name, "Owner already assigned");
                return Ok(());
            }
            let matches = field
                .declared_type
                .as_deref()
                .is_some_and(|declared| graph.is_instance(container, declared));
            if current.is_none() && matches {
                slots.push(Slot::Field(field.name.clone()));
            }
        }
        for hook in registry.owner_hooks(&type_name) {
            if graph.is_instance(container, &hook.owner_type) {
                slots.push(Slot::Hook(hook.name.clone()));
            }
        }

        if cx.config().strict_owner_matching && slots.len() > 1 {
            return Err(SchemaError::AmbiguousOwner {
                type_name,
                container_type: graph.type_name(container)?.to_string(),
                fields: slots.iter().map(|s| s.name().to_string()).collect(),
            }
            .into());
        }

        for slot in slots {
            match slot {
                Slot::Field(field) => {
                    debug!(object = %graph.describe(id), field = %field, owner = %graph.describe(container), "Assigning owner");
                    graph.set(id, &field, container)?;
                    return Ok(());
                }
                Slot::Hook(name) => {
                    if !graph.mark_owner_hook(id, &name) {
                        continue;
                    }
                    let Some(hook) = registry
                        .owner_hooks(&type_name)
                        .into_iter()
                        .find(|hook| hook.name == name)
                    else {
                        continue;
                    };
                    debug!(object = %graph.describe(id), hook = %name, owner = %graph.describe(container), "Firing owner hook");
                    (hook.callback)(graph, id, container)?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn assign_scoped(graph: &mut ModelGraph, node: &Node) -> Result<()> {
        let registry = graph.shared_registry();
        let type_name = graph.type_name(node.id)?.to_string();
        for field in registry.owner_fields(&type_name) {
            let (Some(scope), Some(declared)) = (field.owner, field.declared_type.as_deref()) else {
                continue;
            };
            if scope == OwnerScope::Direct || graph.get_object(node.id, &field.name)?.is_some() {
                continue;
            }
            let owner = match scope {
                OwnerScope::Transitive => node
                    .nearest_ancestors()
                    .find(|ancestor| graph.is_instance(*ancestor, declared)),
                OwnerScope::Root => Some(node.root_id())
                    .filter(|root| graph.is_instance(*root, declared)),
                OwnerScope::Direct => None,
            };
            if let Some(owner) = owner {
                debug!(object = %graph.describe(node.id), field = %field.name, owner = %graph.describe(owner), ?scope, "Assigning owner");
                graph.set(node.id, &field.name, owner)?;
            }
        }
        Ok(())
    }
}

impl ModelVisitor for OwnerPhase {
    fn name(&self) -> &str {
        "assign-owners"
    }

    fn visit(&self, cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        let Some(container) = node.parent else {
            return Ok(());
        };
        Self::assign_direct(cx, graph, node.id, container)?;
        Self::assign_scoped(graph, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use modelforge_config::BuildConfig;
    use modelforge_model::{FieldDescriptor, ModelType, OwnerHook, TypeRegistry};
    use modelforge_phase_api::{BuildReport, PhaseRegistry};
    use modelforge_utils::error::BuildError;
    use modelforge_utils::types::Phase;
    use proptest::prelude::*;

    fn run(graph: &mut ModelGraph, root: ObjectId, config: BuildConfig) -> Result<BuildReport, BuildError> {
        let mut registry = PhaseRegistry::new();
        registry.register_visitor(Phase::OWNER, OwnerPhase::new()).unwrap();
        let mut cx = BuildContext::new(Arc::new(registry), Arc::new(config));
        cx.enter(root);
        let result = cx.execute_if_ready(graph).map(|r| r.unwrap());
        cx.leave().unwrap();
        result
    }

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::builder()
                .register(
                    ModelType::new("Site")
                        .field(FieldDescriptor::single("rack", "Rack"))
                        .field(FieldDescriptor::collection("spares", "Server")),
                )
                .register(
                    ModelType::new("Rack")
                        .field(FieldDescriptor::single("site", "Site").owner())
                        .field(FieldDescriptor::collection("servers", "Server")),
                )
                .register(
                    ModelType::new("Server")
                        .field(FieldDescriptor::single("rack", "Rack").owner())
                        .field(FieldDescriptor::single("holder", "Site").owner())
                        .field(
                            FieldDescriptor::single("site", "Site").owner_scope(OwnerScope::Transitive),
                        )
                        .field(FieldDescriptor::single("top", "Site").owner_scope(OwnerScope::Root)),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_direct_transitive_and_root_owners() {
        let mut graph = ModelGraph::new(registry());
        let site = graph.create("Site").unwrap();
        let rack = graph.create("Rack").unwrap();
        let server = graph.create("Server").unwrap();
        graph.set(site, "rack", rack).unwrap();
        graph.push(rack, "servers", server).unwrap();

        run(&mut graph, site, BuildConfig::default()).unwrap();

        assert_eq!(graph.get_object(rack, "site").unwrap(), Some(site));
        assert_eq!(graph.get_object(server, "rack").unwrap(), Some(rack));
        assert_eq!(graph.get_object(server, "holder").unwrap(), None);
        assert_eq!(graph.get_object(server, "site").unwrap(), Some(site));
        assert_eq!(graph.get_object(server, "top").unwrap(), Some(site));
    }

    #[test]
    fn test_assigned_owner_is_kept() {
        let mut graph = ModelGraph::new(registry());
        let site = graph.create("Site").unwrap();
        let first = graph.create("Rack").unwrap();
        let second = graph.create("Rack").unwrap();
        let server = graph.create("Server").unwrap();
        graph.set(site, "rack", first).unwrap();
        graph.push(first, "servers", server).unwrap();
        graph.set(server, "rack", second).unwrap();

        run(&mut graph, site, BuildConfig::default()).unwrap();
        assert_eq!(graph.get_object(server, "rack").unwrap(), Some(second));
    }

    #[test]
    fn test_first_declared_owner_wins_unless_strict() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("Box").field(FieldDescriptor::single("item", "Item")))
                .register(
                    ModelType::new("Item")
                        .field(FieldDescriptor::single("parent", "Box").owner())
                        .field(FieldDescriptor::single("container", "Box").owner()),
                )
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(Arc::clone(&registry));
        let boxed = graph.create("Box").unwrap();
        let item = graph.create("Item").unwrap();
        graph.set(boxed, "item", item).unwrap();

        run(&mut graph, boxed, BuildConfig::default()).unwrap();
        assert_eq!(graph.get_object(item, "parent").unwrap(), Some(boxed));
        assert_eq!(graph.get_object(item, "container").unwrap(), None);

        let mut graph = ModelGraph::new(registry);
        let boxed = graph.create("Box").unwrap();
        let item = graph.create("Item").unwrap();
        graph.set(boxed, "item", item).unwrap();
        let strict = BuildConfig::builder().strict_owner_matching(true).build().unwrap();
        let err = run(&mut graph, boxed, strict).unwrap_err();
        assert!(matches!(err.cause(), BuildError::Schema(SchemaError::AmbiguousOwner { .. })));
    }

    #[test]
    fn test_owner_hook_fires_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("Box").field(FieldDescriptor::single("item", "Item")))
                .register(ModelType::new("Item").field(FieldDescriptor::scalar("label")).owner_hook(
                    OwnerHook::new("adopt", "Box", move |graph, id, owner| {
                        seen.lock().unwrap().push((id, owner));
                        graph.set(id, "label", "adopted")?;
                        Ok(())
                    }),
                ))
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let boxed = graph.create("Box").unwrap();
        let item = graph.create("Item").unwrap();
        graph.set(boxed, "item", item).unwrap();

        run(&mut graph, boxed, BuildConfig::default()).unwrap();
        run(&mut graph, boxed, BuildConfig::default()).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![(item, boxed)]);
        assert_eq!(graph.get(item, "label").unwrap().as_str(), Some("adopted"));
    }

    proptest! {
        #[test]
        fn prop_later_container_never_replaces_owner(
            placement in prop::collection::vec(0usize..3, 1..8),
            moves in prop::collection::vec((0usize..8, 0usize..3), 0..6),
        ) {
            let mut graph = ModelGraph::new(registry());
            let racks: Vec<ObjectId> = (0..3).map(|_| graph.create("Rack").unwrap()).collect();
            let mut servers = Vec::new();
            for rack in &placement {
                let server = graph.create("Server").unwrap();
                graph.push(racks[*rack], "servers", server).unwrap();
                servers.push(server);
            }
            for rack in &racks {
                run(&mut graph, *rack, BuildConfig::default()).unwrap();
            }

            for (server, rack) in moves {
                if let Some(server) = servers.get(server) {
                    graph.push(racks[rack], "servers", *server).unwrap();
                }
            }
            for rack in racks.iter().rev() {
                run(&mut graph, *rack, BuildConfig::default()).unwrap();
            }

            for (server, rack) in servers.iter().zip(&placement) {
                prop_assert_eq!(graph.get_object(*server, "rack").unwrap(), Some(racks[*rack]));
            }
        }
    }
}
