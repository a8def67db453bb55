//! Link phase: declarative cross-references resolved against a provider
//!
//! A link field is filled in two steps. First a provider is found: the
//! field's expression, the nearest ancestor of a named type, or the object's
//! owner. Then a target field is chosen on the provider and its value is
//! copied into the link field. An empty provider, or a mapping provider
//! without an entry for the link, leaves the field empty without error.

use anyhow::Result;
use tracing::{debug, trace};

use modelforge_model::{FieldDescriptor, FieldKind, LinkSpec, LinkStrategy, ModelGraph, TypeRegistry, Value};
use modelforge_phase_api::{BuildContext, ModelVisitor, Node};
use modelforge_utils::error::LinkError;
use modelforge_utils::types::ObjectId;

/// Resolves every empty link field of each visited object.
#[derive(Debug, Clone, Default)]
pub struct LinkPhase;

impl LinkPhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ModelVisitor for LinkPhase {
    fn name(&self) -> &str {
        "resolve-links"
    }

    fn visit(&self, _cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        let registry = graph.shared_registry();
        let type_name = graph.type_name(node.id)?.to_string();
        for field in registry.fields_of(&type_name) {
            let Some(spec) = &field.link else {
                continue;
            };
            if !graph.get(node.id, &field.name)?.is_empty() {
                continue;
            }
            let resolver = LinkResolver {
                registry: &registry,
                graph: &*graph,
                node,
                type_name: &type_name,
                field,
                spec,
            };
            match resolver.resolve()? {
                Some(value) => {
                    debug!(object = %graph.describe(node.id), field = %field.name, "Resolved link");
                    graph.set(node.id, &field.name, value)?;
                }
                None => trace!(object = %graph.describe(node.id), field = %field.name, "Link skipped"),
            }
        }
        Ok(())
    }
}

struct LinkResolver<'a> {
    registry: &'a TypeRegistry,
    graph: &'a ModelGraph,
    node: &'a Node,
    type_name: &'a str,
    field: &'a FieldDescriptor,
    spec: &'a LinkSpec,
}

impl LinkResolver<'_> {
    fn link_name(&self) -> String {
        format!("{}.{}", self.type_name, self.field.name)
    }

    /// The value to assign, or `None` when the link is skipped.
    fn resolve(&self) -> Result<Option<Value>, LinkError> {
        let provider = self.provider()?;
        let value = match provider {
            Value::Ref(provider) => {
                let target = self.target_field(provider)?;
                self.graph
                    .get(provider, &target)
                    .cloned()
                    .unwrap_or_default()
            }
            other => other,
        };
        let value = match value {
            Value::Map(entries) if self.field.kind != FieldKind::Mapping => {
                match entries.get(&self.field.name) {
                    Some(entry) => entry.clone(),
                    None => return Ok(None),
                }
            }
            other => other,
        };
        if value.is_empty() {
            return Ok(None);
        }
        self.check_type(&value)?;
        Ok(Some(value))
    }

    fn provider(&self) -> Result<Value, LinkError> {
        if let Some(expression) = &self.spec.expression {
            return Ok(expression(self.graph, self.node.id));
        }
        if let Some(ancestor_type) = &self.spec.ancestor_type {
            return Ok(self
                .node
                .nearest_ancestors()
                .find(|ancestor| self.graph.is_instance(*ancestor, ancestor_type))
                .map_or(Value::Empty, Value::Ref));
        }

        let owners = self.registry.owner_fields(self.type_name);
        let owner = match &self.spec.owner_field {
            Some(name) => owners.iter().find(|f| &f.name == name).ok_or_else(|| {
                LinkError::UnknownOwnerField {
                    type_name: self.type_name.to_string(),
                    field: self.field.name.clone(),
                    owner_field: name.clone(),
                }
            })?,
            None => match owners.as_slice() {
                [] => {
                    return Err(LinkError::NoOwnerField {
                        type_name: self.type_name.to_string(),
                        field: self.field.name.clone(),
                    });
                }
                [single] => single,
                several => {
                    return Err(LinkError::AmbiguousOwner {
                        type_name: self.type_name.to_string(),
                        field: self.field.name.clone(),
                        owners: several.iter().map(|f| f.name.clone()).collect(),
                    });
                }
            },
        };
        Ok(self
            .graph
            .get(self.node.id, &owner.name)
            .cloned()
            .unwrap_or_default())
    }

    fn target_field(&self, provider: ObjectId) -> Result<String, LinkError> {
        let provider_type = self
            .graph
            .type_name(provider)
            .map_err(|_| LinkError::TypeMismatch {
                link: self.link_name(),
                expected: "a model object".to_string(),
                found: provider.to_string(),
            })?;
        let fields = self.registry.fields_of(provider_type);
        // The provider field holding the linking object itself never matches by name or type.
        let holds_node = |name: &str| {
            self.graph
                .get(provider, name)
                .is_ok_and(|value| value.as_object() == Some(self.node.id))
        };
        // Name matches count only for provider fields able to supply the link.
        let has = |name: &str| {
            fields
                .iter()
                .any(|f| f.name == name && self.resolvable(f) && !holds_node(name))
        };

        if let Some(target) = &self.spec.target_field {
            if fields.iter().any(|f| &f.name == target) {
                return Ok(target.clone());
            }
            return Err(LinkError::UnknownTargetField {
                link: self.link_name(),
                provider_type: provider_type.to_string(),
                target: target.clone(),
            });
        }

        if let Some(tag) = &self.spec.tag {
            let candidates: Vec<String> = fields
                .iter()
                .filter(|f| f.source_tags.iter().any(|t| t == tag))
                .map(|f| f.name.clone())
                .collect();
            return match candidates.as_slice() {
                [single] => Ok(single.clone()),
                _ => Err(LinkError::TagMismatch {
                    link: self.link_name(),
                    provider_type: provider_type.to_string(),
                    tag: tag.clone(),
                    candidates,
                }),
            };
        }

        let instance_match = self.node.instance_name().filter(|name| has(*name));
        let field_match = Some(self.field.name.as_str()).filter(|name| has(*name));
        match (instance_match, field_match) {
            (Some(instance), Some(field)) if instance != field => {
                return match self.spec.strategy {
                    Some(LinkStrategy::InstanceName) => Ok(instance.to_string()),
                    Some(LinkStrategy::FieldName) => Ok(field.to_string()),
                    None => Err(LinkError::AmbiguousLink {
                        link: self.link_name(),
                        provider_type: provider_type.to_string(),
                        instance_match: instance.to_string(),
                        field_match: field.to_string(),
                    }),
                };
            }
            (Some(name), _) | (None, Some(name)) => return Ok(name.to_string()),
            (None, None) => {}
        }

        let declared = self.field.declared_type.clone().unwrap_or_else(|| "scalar".to_string());
        let candidates: Vec<String> = fields
            .iter()
            .filter(|f| f.source_tags.is_empty() && !f.is_owner())
            .filter(|f| self.assignable(f) && !holds_node(f.name.as_str()))
            .map(|f| f.name.clone())
            .collect();
        match candidates.as_slice() {
            [single] => Ok(single.clone()),
            [] => Err(LinkError::NoAssignableField {
                link: self.link_name(),
                provider_type: provider_type.to_string(),
                declared,
            }),
            _ => Err(LinkError::AmbiguousAssignable {
                link: self.link_name(),
                provider_type: provider_type.to_string(),
                declared,
                candidates,
            }),
        }
    }

    /// Whether values of the provider field `candidate` fit the link field.
    fn assignable(&self, candidate: &FieldDescriptor) -> bool {
        candidate.kind == self.field.kind && self.compatible(candidate)
    }

    /// Assignable, or a mapping a single-valued link looks its own name up in.
    fn resolvable(&self, candidate: &FieldDescriptor) -> bool {
        self.assignable(candidate)
            || (candidate.kind == FieldKind::Mapping
                && matches!(self.field.kind, FieldKind::Single | FieldKind::Scalar)
                && self.compatible(candidate))
    }

    fn compatible(&self, candidate: &FieldDescriptor) -> bool {
        match (&candidate.declared_type, &self.field.declared_type) {
            (Some(found), Some(expected)) => self.registry.is_subtype(found, expected),
            (None, None) => true,
            _ => false,
        }
    }

    fn check_type(&self, value: &Value) -> Result<(), LinkError> {
        let Some(expected) = &self.field.declared_type else {
            return Ok(());
        };
        let mismatch = |found: String| LinkError::TypeMismatch {
            link: self.link_name(),
            expected: expected.clone(),
            found,
        };
        let check = |item: &Value| match item.as_object() {
            Some(id) if self.graph.is_instance(id, expected) => Ok(()),
            Some(id) => Err(mismatch(
                self.graph
                    .type_name(id)
                    .map_or_else(|_| id.to_string(), str::to_string),
            )),
            None => Err(mismatch(item.kind_name().to_string())),
        };
        match (self.field.kind, value) {
            (FieldKind::Single, item) => check(item),
            (FieldKind::Collection, Value::List(items)) => items.iter().try_for_each(check),
            (FieldKind::Mapping, Value::Map(entries)) => entries.values().try_for_each(check),
            (_, other) => Err(mismatch(other.kind_name().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use modelforge_config::BuildConfig;
    use modelforge_model::ModelType;
    use modelforge_phase_api::{BuildReport, PhaseRegistry};
    use modelforge_utils::error::BuildError;
    use modelforge_utils::types::Phase;

    fn run(graph: &mut ModelGraph, root: ObjectId) -> Result<BuildReport, BuildError> {
        let mut registry = PhaseRegistry::new();
        registry.register_visitor(Phase::LINK, LinkPhase::new()).unwrap();
        let mut cx = BuildContext::new(Arc::new(registry), Arc::new(BuildConfig::default()));
        cx.enter(root);
        let result = cx.execute_if_ready(graph).map(|r| r.unwrap());
        cx.leave().unwrap();
        result
    }

    fn link_error(result: Result<BuildReport, BuildError>) -> LinkError {
        match result.map_err(BuildError::into_cause) {
            Err(BuildError::Link(err)) => err,
            other => panic!("expected link error, got {other:?}"),
        }
    }

    /// `Site { pool, primary, backup, service }`, where `service` links into
    /// the site through its owner.
    fn site_registry(link: LinkSpec) -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::builder()
                .register(
                    ModelType::new("Site")
                        .field(FieldDescriptor::single("primary", "Pool"))
                        .field(FieldDescriptor::single("backup", "Pool").source_tag("fallback"))
                        .field(FieldDescriptor::single("service", "Service")),
                )
                .register(ModelType::new("Pool").field(FieldDescriptor::scalar("name").key()))
                .register(
                    ModelType::new("Service")
                        .field(FieldDescriptor::single("site", "Site").owner())
                        .field(FieldDescriptor::single("pool", "Pool").link(link)),
                )
                .build()
                .unwrap(),
        )
    }

    fn site(link: LinkSpec) -> (ModelGraph, ObjectId, ObjectId, ObjectId, ObjectId) {
        let mut graph = ModelGraph::new(site_registry(link));
        let site = graph.create("Site").unwrap();
        let primary = graph.create_keyed("Pool", "primary").unwrap();
        let backup = graph.create_keyed("Pool", "backup").unwrap();
        let service = graph.create("Service").unwrap();
        graph.set(site, "primary", primary).unwrap();
        graph.set(site, "backup", backup).unwrap();
        graph.set(site, "service", service).unwrap();
        graph.set(service, "site", site).unwrap();
        (graph, site, primary, backup, service)
    }

    #[test]
    fn test_single_assignable_field_skips_source_tagged() {
        let (mut graph, site, primary, _, service) = site(LinkSpec::new());
        run(&mut graph, site).unwrap();
        assert_eq!(graph.get_object(service, "pool").unwrap(), Some(primary));
    }

    #[test]
    fn test_tag_and_explicit_target() {
        let (mut graph, site, _, backup, service) = site(LinkSpec::new().tag("fallback"));
        run(&mut graph, site).unwrap();
        assert_eq!(graph.get_object(service, "pool").unwrap(), Some(backup));

        let (mut graph, site, primary, _, service) = self::site(LinkSpec::new().target("primary"));
        run(&mut graph, site).unwrap();
        assert_eq!(graph.get_object(service, "pool").unwrap(), Some(primary));

        let (mut graph, site, ..) = self::site(LinkSpec::new().target("missing"));
        assert!(matches!(
            link_error(run(&mut graph, site)),
            LinkError::UnknownTargetField { .. }
        ));

        let (mut graph, site, ..) = self::site(LinkSpec::new().tag("nothing"));
        assert!(matches!(
            link_error(run(&mut graph, site)),
            LinkError::TagMismatch { .. }
        ));
    }

    #[test]
    fn test_null_provider_skips() {
        let (mut graph, site, _, _, service) = site(LinkSpec::new().expression(|_, _| Value::Empty));
        run(&mut graph, site).unwrap();
        assert!(graph.get(service, "pool").unwrap().is_empty());
    }

    #[test]
    fn test_mapping_provider_uses_field_name() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(
                    ModelType::new("Root")
                        .field(FieldDescriptor::mapping("pools", "Pool"))
                        .field(FieldDescriptor::single("app", "App")),
                )
                .register(ModelType::new("Pool").field(FieldDescriptor::scalar("name").key()))
                .register(
                    ModelType::new("App")
                        .field(FieldDescriptor::single("db", "Pool").link(LinkSpec::new().ancestor("Root").target("pools")))
                        .field(FieldDescriptor::single("cache", "Pool").link(LinkSpec::new().ancestor("Root").target("pools"))),
                )
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let root = graph.create("Root").unwrap();
        let db = graph.create_keyed("Pool", "db").unwrap();
        graph.insert_keyed(root, "pools", db).unwrap();
        let app = graph.create("App").unwrap();
        graph.set(root, "app", app).unwrap();

        run(&mut graph, root).unwrap();
        assert_eq!(graph.get_object(app, "db").unwrap(), Some(db));
        assert!(graph.get(app, "cache").unwrap().is_empty());
    }

    fn naming_registry(strategy: Option<LinkStrategy>) -> Arc<TypeRegistry> {
        let mut link = LinkSpec::new();
        if let Some(strategy) = strategy {
            link = link.strategy(strategy);
        }
        Arc::new(
            TypeRegistry::builder()
                .register(
                    ModelType::new("Cluster")
                        .field(FieldDescriptor::mapping("nodes", "Node"))
                        .field(FieldDescriptor::single("web", "Node"))
                        .field(FieldDescriptor::single("peer", "Node")),
                )
                .register(
                    ModelType::new("Node")
                        .field(FieldDescriptor::scalar("name").key())
                        .field(FieldDescriptor::single("cluster", "Cluster").owner())
                        .field(FieldDescriptor::single("peer", "Node").link(link)),
                )
                .build()
                .unwrap(),
        )
    }

    /// A node keyed `web` in `Cluster.nodes`: its instance name matches
    /// `Cluster.web` while its field name matches `Cluster.peer`.
    fn cluster(strategy: Option<LinkStrategy>) -> (ModelGraph, ObjectId, ObjectId, ObjectId, ObjectId) {
        let mut graph = ModelGraph::new(naming_registry(strategy));
        let cluster = graph.create("Cluster").unwrap();
        let node = graph.create_keyed("Node", "web").unwrap();
        graph.insert_keyed(cluster, "nodes", node).unwrap();
        graph.set(node, "cluster", cluster).unwrap();
        let web = graph.create_keyed("Node", "w2").unwrap();
        let peer = graph.create_keyed("Node", "p").unwrap();
        graph.set(cluster, "web", web).unwrap();
        graph.set(cluster, "peer", peer).unwrap();
        (graph, cluster, node, web, peer)
    }

    #[test]
    fn test_instance_and_field_name_conflict_needs_strategy() {
        let (mut graph, cluster_id, ..) = cluster(None);
        assert!(matches!(
            link_error(run(&mut graph, cluster_id)),
            LinkError::AmbiguousLink { .. }
        ));

        let (mut graph, cluster_id, node, _, peer) = cluster(Some(LinkStrategy::FieldName));
        run(&mut graph, cluster_id).unwrap();
        assert_eq!(graph.get_object(node, "peer").unwrap(), Some(peer));

        let (mut graph, cluster_id, node, web, _) = cluster(Some(LinkStrategy::InstanceName));
        run(&mut graph, cluster_id).unwrap();
        assert_eq!(graph.get_object(node, "peer").unwrap(), Some(web));
    }

    #[test]
    fn test_owner_provider_errors() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("Pool").field(FieldDescriptor::scalar("name").key()))
                .register(
                    ModelType::new("Orphan")
                        .field(FieldDescriptor::single("pool", "Pool").link(LinkSpec::new())),
                )
                .register(
                    ModelType::new("Twin")
                        .field(FieldDescriptor::single("a", "Orphan").owner())
                        .field(FieldDescriptor::single("b", "Orphan").owner())
                        .field(FieldDescriptor::single("pool", "Pool").link(LinkSpec::new())),
                )
                .register(
                    ModelType::new("Named")
                        .field(FieldDescriptor::single("a", "Orphan").owner())
                        .field(
                            FieldDescriptor::single("pool", "Pool")
                                .link(LinkSpec::new().owner_field("missing")),
                        ),
                )
                .build()
                .unwrap(),
        );

        let mut graph = ModelGraph::new(Arc::clone(&registry));
        let orphan = graph.create("Orphan").unwrap();
        assert!(matches!(link_error(run(&mut graph, orphan)), LinkError::NoOwnerField { .. }));

        let twin = graph.create("Twin").unwrap();
        assert!(matches!(link_error(run(&mut graph, twin)), LinkError::AmbiguousOwner { .. }));

        let named = graph.create("Named").unwrap();
        assert!(matches!(
            link_error(run(&mut graph, named)),
            LinkError::UnknownOwnerField { .. }
        ));
    }

    #[test]
    fn test_resolved_value_must_match_declared_type() {
        let (mut graph, site, _, _, service) = site(LinkSpec::new().expression(|graph, id| {
            graph.get(id, "site").cloned().unwrap_or_default()
        }));
        // The expression yields the Site itself; its single assignable Pool field is `primary`.
        run(&mut graph, site).unwrap();
        assert!(graph.get_object(service, "pool").unwrap().is_some());

        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("Pool").field(FieldDescriptor::scalar("name").key()))
                .register(ModelType::new("Other"))
                .register(
                    ModelType::new("Holder")
                        .field(FieldDescriptor::single("other", "Other"))
                        .field(FieldDescriptor::single("pool", "Pool").link(
                            LinkSpec::new().expression(|graph, id| {
                                Value::Map(indexmap_of("pool", graph.get(id, "other").cloned().unwrap_or_default()))
                            }),
                        )),
                )
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let holder = graph.create("Holder").unwrap();
        let other = graph.create("Other").unwrap();
        graph.set(holder, "other", other).unwrap();
        assert!(matches!(
            link_error(run(&mut graph, holder)),
            LinkError::TypeMismatch { .. }
        ));
    }

    /// `Cluster { nodes: {key: Node}, <singles>: Node, <scalars>: scalar }`
    /// with every declared field filled. Only the mapped node has its owner
    /// set, so it is the only object whose `peer` link resolves.
    fn peer_cluster(
        key: &str,
        singles: &[&str],
        scalars: &[&str],
    ) -> (ModelGraph, ObjectId, ObjectId, Vec<ObjectId>) {
        let mut cluster_type = ModelType::new("Cluster").field(FieldDescriptor::mapping("nodes", "Node"));
        for name in singles {
            cluster_type = cluster_type.field(FieldDescriptor::single(*name, "Node"));
        }
        for name in scalars {
            cluster_type = cluster_type.field(FieldDescriptor::scalar(*name));
        }
        let registry = TypeRegistry::builder()
            .register(cluster_type)
            .register(
                ModelType::new("Node")
                    .field(FieldDescriptor::scalar("name").key())
                    .field(FieldDescriptor::single("cluster", "Cluster").owner())
                    .field(FieldDescriptor::single("peer", "Node").link(LinkSpec::new())),
            )
            .build()
            .unwrap();

        let mut graph = ModelGraph::new(Arc::new(registry));
        let cluster = graph.create("Cluster").unwrap();
        let node = graph.create_keyed("Node", key).unwrap();
        graph.insert_keyed(cluster, "nodes", node).unwrap();
        graph.set(node, "cluster", cluster).unwrap();
        let held = singles
            .iter()
            .map(|name| {
                let held = graph.create_keyed("Node", format!("{name}-node")).unwrap();
                graph.set(cluster, name, held).unwrap();
                held
            })
            .collect();
        for name in scalars {
            graph.set(cluster, name, "a label").unwrap();
        }
        (graph, cluster, node, held)
    }

    #[test]
    fn test_name_match_ignores_fields_that_cannot_hold_the_link() {
        // `Cluster.web` shares the node's instance name but holds a scalar.
        let (mut graph, cluster, node, held) = peer_cluster("web", &["peer"], &["web"]);
        run(&mut graph, cluster).unwrap();
        assert_eq!(graph.get_object(node, "peer").unwrap(), Some(held[0]));
    }

    #[test]
    fn test_lone_instance_name_match() {
        let (mut graph, cluster, node, held) = peer_cluster("web", &["web", "other"], &[]);
        run(&mut graph, cluster).unwrap();
        assert_eq!(graph.get_object(node, "peer").unwrap(), Some(held[0]));
    }

    #[test]
    fn test_lone_field_name_match() {
        let (mut graph, cluster, node, held) = peer_cluster("x", &["other", "peer"], &[]);
        run(&mut graph, cluster).unwrap();
        assert_eq!(graph.get_object(node, "peer").unwrap(), Some(held[1]));
    }

    #[test]
    fn test_assignable_fallback_needs_exactly_one_field() {
        let (mut graph, cluster, node, held) = peer_cluster("x", &["only"], &["label"]);
        run(&mut graph, cluster).unwrap();
        assert_eq!(graph.get_object(node, "peer").unwrap(), Some(held[0]));

        let (mut graph, cluster, ..) = peer_cluster("x", &[], &["label"]);
        match link_error(run(&mut graph, cluster)) {
            LinkError::NoAssignableField { link, declared, .. } => {
                assert_eq!(link, "Node.peer");
                assert_eq!(declared, "Node");
            }
            other => panic!("expected no assignable field, got {other:?}"),
        }

        let (mut graph, cluster, ..) = peer_cluster("x", &["left", "right"], &[]);
        match link_error(run(&mut graph, cluster)) {
            LinkError::AmbiguousAssignable { candidates, .. } => {
                assert_eq!(candidates, vec!["left", "right"]);
            }
            other => panic!("expected ambiguous assignable fields, got {other:?}"),
        }
    }

    #[test]
    fn test_tag_shared_by_several_fields() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(
                    ModelType::new("Site")
                        .field(FieldDescriptor::single("primary", "Pool").source_tag("pools"))
                        .field(FieldDescriptor::single("backup", "Pool").source_tag("pools"))
                        .field(FieldDescriptor::single("service", "Service")),
                )
                .register(ModelType::new("Pool").field(FieldDescriptor::scalar("name").key()))
                .register(
                    ModelType::new("Service")
                        .field(FieldDescriptor::single("site", "Site").owner())
                        .field(FieldDescriptor::single("pool", "Pool").link(LinkSpec::new().tag("pools"))),
                )
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let site = graph.create("Site").unwrap();
        let service = graph.create("Service").unwrap();
        graph.set(site, "service", service).unwrap();
        graph.set(service, "site", site).unwrap();

        match link_error(run(&mut graph, site)) {
            LinkError::TagMismatch { tag, candidates, .. } => {
                assert_eq!(tag, "pools");
                assert_eq!(candidates, vec!["primary", "backup"]);
            }
            other => panic!("expected a tag mismatch, got {other:?}"),
        }
    }

    fn indexmap_of(key: &str, value: Value) -> indexmap::IndexMap<String, Value> {
        indexmap::IndexMap::from([(key.to_string(), value)])
    }
}
