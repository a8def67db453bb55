//! Auto-create phase: lazily constructed children

use anyhow::Result;
use tracing::debug;

use modelforge_model::{FieldDescriptor, ModelGraph, TypeRegistry};
use modelforge_model::descriptor::ParamsProvider;
use modelforge_phase_api::{BuildContext, ModelVisitor, Node};
use modelforge_utils::error::SchemaError;
use modelforge_utils::types::ObjectId;

/// Fills empty auto-create fields, then empty cluster members, through the
/// graph factory.
///
/// Created children are visited later in the same walk, so their own
/// auto-create fields are filled too.
#[derive(Debug, Clone, Default)]
pub struct AutoCreatePhase;

impl AutoCreatePhase {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// The type to instantiate for `field`.
fn concrete_type(
    registry: &TypeRegistry,
    owner_type: &str,
    field: &FieldDescriptor,
    explicit: Option<&str>,
) -> Result<String, SchemaError> {
    let declared = field
        .declared_type
        .as_deref()
        .ok_or_else(|| SchemaError::InvalidRole {
            type_name: owner_type.to_string(),
            field: field.name.clone(),
            reason: "auto-create needs a declared model type".to_string(),
        })?;
    let concrete = explicit.unwrap_or(declared);
    let model_type = registry.require(concrete)?;
    if model_type.is_abstract {
        return Err(match explicit {
            None => SchemaError::AbstractAutoCreate {
                type_name: owner_type.to_string(),
                field: field.name.clone(),
                declared: declared.to_string(),
            },
            Some(_) => SchemaError::AutoCreateTypeMismatch {
                type_name: owner_type.to_string(),
                field: field.name.clone(),
                concrete: concrete.to_string(),
                declared: declared.to_string(),
            },
        });
    }
    if !registry.is_subtype(concrete, declared) {
        return Err(SchemaError::AutoCreateTypeMismatch {
            type_name: owner_type.to_string(),
            field: field.name.clone(),
            concrete: concrete.to_string(),
            declared: declared.to_string(),
        });
    }
    Ok(concrete.to_string())
}

fn create_into(
    graph: &mut ModelGraph,
    id: ObjectId,
    field: &FieldDescriptor,
    concrete: &str,
    provider: &ParamsProvider,
) -> Result<()> {
    let params = provider()?;
    let child = graph.create_with(concrete, params)?;
    debug!(object = %graph.describe(id), field = %field.name, child = %graph.describe(child), "Auto-created child");
    graph.set(id, &field.name, child)?;
    Ok(())
}

impl ModelVisitor for AutoCreatePhase {
    fn name(&self) -> &str {
        "auto-create"
    }

    fn visit(&self, _cx: &mut BuildContext, graph: &mut ModelGraph, node: &Node) -> Result<()> {
        let registry = graph.shared_registry();
        let type_name = graph.type_name(node.id)?.to_string();

        for field in registry.fields_of(&type_name) {
            let Some(spec) = &field.auto_create else {
                continue;
            };
            if !graph.get(node.id, &field.name)?.is_empty() {
                continue;
            }
            let concrete = concrete_type(&registry, &type_name, field, spec.concrete_type.as_deref())?;
            create_into(graph, node.id, field, &concrete, &spec.provider)?;
        }

        for cluster in registry.clusters(&type_name) {
            for field in registry.cluster_fields(&type_name, cluster) {
                if field.auto_create.is_some() || !graph.get(node.id, &field.name)?.is_empty() {
                    continue;
                }
                let concrete = concrete_type(&registry, &type_name, field, None)?;
                create_into(graph, node.id, field, &concrete, &cluster.provider)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use modelforge_config::BuildConfig;
    use modelforge_model::{AutoCreateCluster, AutoCreateParams, AutoCreateSpec, ModelType};
    use modelforge_phase_api::{BuildReport, PhaseRegistry};
    use modelforge_utils::error::BuildError;
    use modelforge_utils::types::Phase;

    fn run(graph: &mut ModelGraph, root: ObjectId) -> Result<BuildReport, BuildError> {
        let mut registry = PhaseRegistry::new();
        registry.register_visitor(Phase::AUTO_CREATE, AutoCreatePhase::new()).unwrap();
        let mut cx = BuildContext::new(Arc::new(registry), Arc::new(BuildConfig::default()));
        cx.enter(root);
        let result = cx.execute_if_ready(graph).map(|r| r.unwrap());
        cx.leave().unwrap();
        result
    }

    #[test]
    fn test_nested_auto_create_with_params() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("App").field(
                    FieldDescriptor::single("db", "Database").auto_create(AutoCreateSpec::new(|| {
                        Ok(AutoCreateParams::keyed("main").field("port", 5432))
                    })),
                ))
                .register(
                    ModelType::new("Database")
                        .field(FieldDescriptor::scalar("name").key())
                        .field(FieldDescriptor::scalar("port"))
                        .field(FieldDescriptor::single("pool", "Pool").auto_create(AutoCreateSpec::empty())),
                )
                .register(ModelType::new("Pool"))
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let app = graph.create("App").unwrap();

        let report = run(&mut graph, app).unwrap();

        let db = graph.get_object(app, "db").unwrap().unwrap();
        assert_eq!(graph.key_of(db).unwrap().as_deref(), Some("main"));
        assert_eq!(graph.get(db, "port").unwrap().as_i64(), Some(5432));
        assert!(graph.get_object(db, "pool").unwrap().is_some());
        assert_eq!(report.run_of(100).map(|r| r.visited), Some(3));
    }

    #[test]
    fn test_existing_value_is_kept() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("App").field(FieldDescriptor::single("pool", "Pool").auto_create(
                    AutoCreateSpec::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(AutoCreateParams::new())
                    }),
                )))
                .register(ModelType::new("Pool"))
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let app = graph.create("App").unwrap();
        let pool = graph.create("Pool").unwrap();
        graph.set(app, "pool", pool).unwrap();

        run(&mut graph, app).unwrap();
        assert_eq!(graph.get_object(app, "pool").unwrap(), Some(pool));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_key_presence_is_checked() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("App").field(
                    FieldDescriptor::single("db", "Database").auto_create(AutoCreateSpec::empty()),
                ))
                .register(ModelType::new("Database").field(FieldDescriptor::scalar("name").key()))
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let app = graph.create("App").unwrap();
        let err = run(&mut graph, app).unwrap_err();
        assert!(matches!(err.cause(), BuildError::Schema(SchemaError::KeyRequired { .. })));
    }

    #[test]
    fn test_cluster_fills_filtered_members_once_each() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("Listener").abstract_type())
                .register(ModelType::new("Http").extends("Listener"))
                .register(ModelType::new("Grpc").extends("Listener"))
                .register(
                    ModelType::new("Gateway")
                        .field(FieldDescriptor::single("http", "Http"))
                        .field(FieldDescriptor::single("grpc", "Grpc"))
                        .field(FieldDescriptor::single("admin", "Http"))
                        .cluster(
                            AutoCreateCluster::new("Listener", move || {
                                counter.fetch_add(1, Ordering::SeqCst);
                                Ok(AutoCreateParams::new())
                            })
                            .filter(|field| field.name != "admin"),
                        ),
                )
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let gateway = graph.create("Gateway").unwrap();

        run(&mut graph, gateway).unwrap();

        let http = graph.get_object(gateway, "http").unwrap().unwrap();
        let grpc = graph.get_object(gateway, "grpc").unwrap().unwrap();
        assert_eq!(graph.type_name(http).unwrap(), "Http");
        assert_eq!(graph.type_name(grpc).unwrap(), "Grpc");
        assert!(graph.get(gateway, "admin").unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_abstract_cluster_member_is_a_schema_error() {
        let registry = Arc::new(
            TypeRegistry::builder()
                .register(ModelType::new("Listener").abstract_type())
                .register(ModelType::new("Http").extends("Listener"))
                .register(
                    ModelType::new("Gateway")
                        .field(FieldDescriptor::single("any", "Listener"))
                        .cluster(AutoCreateCluster::new("Listener", || Ok(AutoCreateParams::new()))),
                )
                .build()
                .unwrap(),
        );
        let mut graph = ModelGraph::new(registry);
        let gateway = graph.create("Gateway").unwrap();
        let err = run(&mut graph, gateway).unwrap_err();
        assert!(matches!(err.cause(), BuildError::Schema(SchemaError::AbstractAutoCreate { .. })));
    }
}
