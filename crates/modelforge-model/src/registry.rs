//! Registry of model types and the schema checks run when it is built.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use modelforge_utils::error::SchemaError;

use crate::descriptor::{FieldDescriptor, FieldKind};
use crate::model_type::{AutoCreateCluster, ModelType, OwnerHook};

/// Immutable set of model types, validated as a whole.
///
/// Build one with [`TypeRegistry::builder`]; every structural rule on field
/// roles is checked once in [`TypeRegistryBuilder::build`], so the build
/// phases can rely on a consistent schema.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, ModelType>,
}

/// Collects type declarations before validation.
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    types: Vec<ModelType>,
}

impl TypeRegistryBuilder {
    #[must_use]
    pub fn register(mut self, model_type: ModelType) -> Self {
        self.types.push(model_type);
        self
    }

    /// Validate all declarations and produce the registry.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found: duplicate or unknown types,
    /// supertype cycles, duplicate fields, misplaced roles, several key
    /// fields in one hierarchy chain, or a hierarchy mixing keyed and
    /// unkeyed concrete types.
    pub fn build(self) -> Result<TypeRegistry, SchemaError> {
        let mut types = IndexMap::with_capacity(self.types.len());
        for model_type in self.types {
            if types.contains_key(&model_type.name) {
                return Err(SchemaError::DuplicateType {
                    type_name: model_type.name,
                });
            }
            types.insert(model_type.name.clone(), model_type);
        }

        let registry = TypeRegistry { types };
        registry.check_hierarchy()?;
        for model_type in registry.types.values() {
            registry.check_fields(model_type)?;
            registry.check_callbacks(model_type)?;
        }
        registry.check_key_consistency()?;

        debug!(types = registry.types.len(), "Type registry built");
        Ok(registry)
    }
}

impl TypeRegistry {
    #[must_use]
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModelType> {
        self.types.get(name)
    }

    /// Look up a type that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownType`] when `name` is not registered.
    pub fn require(&self, name: &str) -> Result<&ModelType, SchemaError> {
        self.types.get(name).ok_or_else(|| SchemaError::UnknownType {
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The type and its supertypes, most general first.
    #[must_use]
    pub fn lineage(&self, name: &str) -> Vec<&ModelType> {
        let mut chain = Vec::new();
        let mut current = self.types.get(name);
        while let Some(model_type) = current {
            if chain.len() > self.types.len() {
                break;
            }
            chain.push(model_type);
            current = model_type
                .supertype
                .as_deref()
                .and_then(|sup| self.types.get(sup));
        }
        chain.reverse();
        chain
    }

    /// Whether `sub` is `sup` or one of its subtypes.
    #[must_use]
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        self.lineage(sub).iter().any(|t| t.name == sup)
    }

    /// Most general ancestor of `name`.
    #[must_use]
    pub fn hierarchy_root<'a>(&'a self, name: &'a str) -> &'a str {
        self.lineage(name)
            .first()
            .map_or(name, |t| t.name.as_str())
    }

    /// Every field of the type, supertype fields first, in declaration order.
    #[must_use]
    pub fn fields_of(&self, name: &str) -> Vec<&FieldDescriptor> {
        self.lineage(name)
            .into_iter()
            .flat_map(|t| t.fields.iter())
            .collect()
    }

    #[must_use]
    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldDescriptor> {
        self.lineage(type_name)
            .into_iter()
            .flat_map(|t| t.fields.iter())
            .find(|f| f.name == field)
    }

    #[must_use]
    pub fn key_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields_of(name).into_iter().find(|f| f.key)
    }

    #[must_use]
    pub fn is_keyed(&self, name: &str) -> bool {
        self.key_field(name).is_some()
    }

    #[must_use]
    pub fn owner_fields(&self, name: &str) -> Vec<&FieldDescriptor> {
        self.fields_of(name)
            .into_iter()
            .filter(|f| f.owner.is_some())
            .collect()
    }

    #[must_use]
    pub fn owner_hooks(&self, name: &str) -> Vec<&OwnerHook> {
        self.lineage(name)
            .into_iter()
            .flat_map(|t| t.owner_hooks.iter())
            .collect()
    }

    #[must_use]
    pub fn clusters(&self, name: &str) -> Vec<&AutoCreateCluster> {
        self.lineage(name)
            .into_iter()
            .flat_map(|t| t.clusters.iter())
            .collect()
    }

    /// Single-valued fields of `type_name` selected by `cluster`.
    #[must_use]
    pub fn cluster_fields(
        &self,
        type_name: &str,
        cluster: &AutoCreateCluster,
    ) -> Vec<&FieldDescriptor> {
        self.fields_of(type_name)
            .into_iter()
            .filter(|f| f.kind == FieldKind::Single && f.is_containment())
            .filter(|f| {
                f.declared_type
                    .as_deref()
                    .is_some_and(|d| self.is_subtype(d, &cluster.supertype))
            })
            .filter(|f| cluster.filter.as_ref().is_none_or(|filter| filter(f)))
            .collect()
    }

    /// Concrete types assignable to `name`, including `name` itself.
    #[must_use]
    pub fn concrete_subtypes(&self, name: &str) -> Vec<&str> {
        self.types
            .values()
            .filter(|t| !t.is_abstract && self.is_subtype(&t.name, name))
            .map(|t| t.name.as_str())
            .collect()
    }

    fn check_hierarchy(&self) -> Result<(), SchemaError> {
        for model_type in self.types.values() {
            let mut seen = HashSet::new();
            let mut current = model_type;
            loop {
                if !seen.insert(current.name.as_str()) {
                    return Err(SchemaError::SupertypeCycle {
                        type_name: model_type.name.clone(),
                    });
                }
                let Some(sup) = current.supertype.as_deref() else {
                    break;
                };
                current = self
                    .types
                    .get(sup)
                    .ok_or_else(|| SchemaError::UnknownSupertype {
                        type_name: current.name.clone(),
                        supertype: sup.to_string(),
                    })?;
            }
        }
        Ok(())
    }

    fn check_fields(&self, model_type: &ModelType) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        let mut keys = Vec::new();
        for field in self.fields_of(&model_type.name) {
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    type_name: model_type.name.clone(),
                    field: field.name.clone(),
                });
            }
            if field.key {
                keys.push(field.name.clone());
            }
        }
        if keys.len() > 1 {
            return Err(SchemaError::MultipleKeys {
                type_name: model_type.name.clone(),
                fields: keys,
            });
        }

        for field in &model_type.fields {
            self.check_roles(model_type, field)?;
        }
        Ok(())
    }

    fn check_roles(&self, model_type: &ModelType, field: &FieldDescriptor) -> Result<(), SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidRole {
            type_name: model_type.name.clone(),
            field: field.name.clone(),
            reason: reason.to_string(),
        };

        if let Some(declared) = &field.declared_type
            && !self.contains(declared)
        {
            return Err(SchemaError::UnknownDeclaredType {
                type_name: model_type.name.clone(),
                field: field.name.clone(),
                declared: declared.clone(),
            });
        }
        if field.kind == FieldKind::Scalar && field.declared_type.is_some() {
            return Err(invalid("scalar fields cannot declare a model type"));
        }

        if field.key && field.kind != FieldKind::Scalar {
            return Err(invalid("key fields must be scalar"));
        }

        if field.owner.is_some() {
            if field.kind != FieldKind::Single || field.declared_type.is_none() {
                return Err(invalid("owner fields must be single-valued model references"));
            }
            if field.key || field.link.is_some() || field.auto_create.is_some() {
                return Err(invalid("owner fields cannot also be key, link or auto-create"));
            }
        }

        if let Some(link) = &field.link {
            if field.key || field.auto_create.is_some() {
                return Err(invalid("link fields cannot also be key or auto-create"));
            }
            if let Some(ancestor) = &link.ancestor_type
                && !self.contains(ancestor)
            {
                return Err(SchemaError::UnknownType {
                    name: ancestor.clone(),
                });
            }
        }

        if let Some(auto) = &field.auto_create {
            let Some(declared) = field.declared_type.as_deref() else {
                return Err(invalid("auto-create fields must reference a model type"));
            };
            if field.kind != FieldKind::Single {
                return Err(invalid("auto-create fields must be single-valued"));
            }
            match auto.concrete_type.as_deref() {
                Some(concrete) => {
                    let target = self.require(concrete)?;
                    if target.is_abstract || !self.is_subtype(concrete, declared) {
                        return Err(SchemaError::AutoCreateTypeMismatch {
                            type_name: model_type.name.clone(),
                            field: field.name.clone(),
                            concrete: concrete.to_string(),
                            declared: declared.to_string(),
                        });
                    }
                }
                None => {
                    if self.require(declared)?.is_abstract {
                        return Err(SchemaError::AbstractAutoCreate {
                            type_name: model_type.name.clone(),
                            field: field.name.clone(),
                            declared: declared.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn check_callbacks(&self, model_type: &ModelType) -> Result<(), SchemaError> {
        for hook in &model_type.owner_hooks {
            self.require(&hook.owner_type)?;
        }
        for cluster in &model_type.clusters {
            self.require(&cluster.supertype)?;
        }
        Ok(())
    }

    /// Concrete types sharing a hierarchy root must agree on having a key.
    fn check_key_consistency(&self) -> Result<(), SchemaError> {
        let mut hierarchies: BTreeMap<&str, (Vec<String>, Vec<String>)> = BTreeMap::new();
        for model_type in self.types.values().filter(|t| !t.is_abstract) {
            let entry = hierarchies
                .entry(self.hierarchy_root(&model_type.name))
                .or_default();
            if self.is_keyed(&model_type.name) {
                entry.0.push(model_type.name.clone());
            } else {
                entry.1.push(model_type.name.clone());
            }
        }

        for (root, (keyed, unkeyed)) in hierarchies {
            if !keyed.is_empty() && !unkeyed.is_empty() {
                return Err(SchemaError::InconsistentKeys {
                    hierarchy: root.to_string(),
                    keyed,
                    unkeyed,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AutoCreateSpec, LinkSpec};

    fn animals() -> TypeRegistryBuilder {
        TypeRegistry::builder()
            .register(
                ModelType::new("Animal")
                    .abstract_type()
                    .field(FieldDescriptor::scalar("name").key()),
            )
            .register(
                ModelType::new("Dog")
                    .extends("Animal")
                    .field(FieldDescriptor::scalar("breed")),
            )
            .register(ModelType::new("Cat").extends("Animal"))
    }

    #[test]
    fn test_hierarchy_queries() {
        let registry = animals().build().unwrap();

        assert!(registry.is_subtype("Dog", "Animal"));
        assert!(registry.is_subtype("Dog", "Dog"));
        assert!(!registry.is_subtype("Animal", "Dog"));
        assert_eq!(registry.hierarchy_root("Cat"), "Animal");

        let fields: Vec<_> = registry.fields_of("Dog").iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["name", "breed"]);
        assert_eq!(registry.key_field("Cat").map(|f| f.name.as_str()), Some("name"));
        assert_eq!(registry.concrete_subtypes("Animal"), vec!["Dog", "Cat"]);
    }

    #[test]
    fn test_unknown_supertype() {
        let err = TypeRegistry::builder()
            .register(ModelType::new("A").extends("Missing"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownSupertype { .. }));
    }

    #[test]
    fn test_supertype_cycle() {
        let err = TypeRegistry::builder()
            .register(ModelType::new("A").extends("B"))
            .register(ModelType::new("B").extends("A"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::SupertypeCycle { .. }));
    }

    #[test]
    fn test_duplicate_type_and_field() {
        let err = TypeRegistry::builder()
            .register(ModelType::new("A"))
            .register(ModelType::new("A"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateType { .. }));

        let err = TypeRegistry::builder()
            .register(ModelType::new("A").field(FieldDescriptor::scalar("x")))
            .register(
                ModelType::new("B")
                    .extends("A")
                    .field(FieldDescriptor::scalar("x")),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                type_name: "B".into(),
                field: "x".into()
            }
        );
    }

    #[test]
    fn test_two_keys_in_one_chain() {
        let err = animals()
            .register(
                ModelType::new("Bird")
                    .extends("Animal")
                    .field(FieldDescriptor::scalar("ring").key()),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::MultipleKeys { ref type_name, .. } if type_name == "Bird"));
    }

    #[test]
    fn test_inconsistent_keys_in_hierarchy() {
        let err = TypeRegistry::builder()
            .register(ModelType::new("Base").abstract_type())
            .register(
                ModelType::new("Keyed")
                    .extends("Base")
                    .field(FieldDescriptor::scalar("id").key()),
            )
            .register(ModelType::new("Plain").extends("Base"))
            .build()
            .unwrap_err();
        match err {
            SchemaError::InconsistentKeys {
                hierarchy,
                keyed,
                unkeyed,
            } => {
                assert_eq!(hierarchy, "Base");
                assert_eq!(keyed, vec!["Keyed".to_string()]);
                assert_eq!(unkeyed, vec!["Plain".to_string()]);
            }
            other => panic!("expected inconsistent keys, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_roles() {
        let err = TypeRegistry::builder()
            .register(ModelType::new("A").field(FieldDescriptor::scalar("parent").owner()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRole { .. }));

        let err = TypeRegistry::builder()
            .register(ModelType::new("B"))
            .register(
                ModelType::new("A").field(
                    FieldDescriptor::single("b", "B")
                        .link(LinkSpec::new())
                        .auto_create(AutoCreateSpec::empty()),
                ),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRole { .. }));
    }

    #[test]
    fn test_unknown_declared_type() {
        let err = TypeRegistry::builder()
            .register(ModelType::new("A").field(FieldDescriptor::single("b", "Nope")))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownDeclaredType { ref declared, .. } if declared == "Nope"));
    }

    #[test]
    fn test_auto_create_type_rules() {
        let err = animals()
            .register(
                ModelType::new("Kennel")
                    .field(FieldDescriptor::single("pet", "Animal").auto_create(AutoCreateSpec::empty())),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::AbstractAutoCreate { .. }));

        let err = animals()
            .register(ModelType::new("Rock").field(FieldDescriptor::scalar("name").key()))
            .register(
                ModelType::new("Kennel").field(
                    FieldDescriptor::single("pet", "Animal")
                        .auto_create(AutoCreateSpec::empty().concrete("Rock")),
                ),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::AutoCreateTypeMismatch { .. }));

        let registry = animals()
            .register(
                ModelType::new("Kennel").field(
                    FieldDescriptor::single("pet", "Animal")
                        .auto_create(AutoCreateSpec::empty().concrete("Dog")),
                ),
            )
            .build();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_cluster_fields_follow_supertype_and_filter() {
        let registry = animals()
            .register(
                ModelType::new("Farm")
                    .field(FieldDescriptor::single("guard", "Dog"))
                    .field(FieldDescriptor::single("mouser", "Cat"))
                    .field(FieldDescriptor::single("owner", "Dog").owner())
                    .field(FieldDescriptor::scalar("acres")),
            )
            .build()
            .unwrap();

        let all = AutoCreateCluster::new("Animal", || Ok(Default::default()));
        let names: Vec<_> = registry
            .cluster_fields("Farm", &all)
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(names, vec!["guard", "mouser"]);

        let cats_only = AutoCreateCluster::new("Animal", || Ok(Default::default()))
            .filter(|f| f.name != "guard");
        assert_eq!(registry.cluster_fields("Farm", &cats_only).len(), 1);
    }
}
