//! Arena of model objects.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use modelforge_utils::error::{BuildError, ModelError, SchemaError};
use modelforge_utils::types::ObjectId;

use crate::descriptor::{FieldDescriptor, FieldKind};
use crate::model_type::ModelType;
use crate::registry::TypeRegistry;
use crate::value::{AutoCreateParams, Value};

/// Where a child sits inside the field that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// The field value itself.
    Direct,
    /// Element of a collection.
    Index(usize),
    /// Entry of a mapping.
    Key(String),
}

/// Containment edge from a parent object to one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub field: String,
    pub position: Position,
    pub target: ObjectId,
}

impl Edge {
    /// Name under which the child is known in its container: the field name
    /// for single-valued fields, the entry key for mappings. Collection
    /// elements have no instance name.
    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        match &self.position {
            Position::Direct => Some(&self.field),
            Position::Key(key) => Some(key),
            Position::Index(_) => None,
        }
    }

    /// Path suffix appended to the parent's path, e.g. `.servers[alpha]`.
    #[must_use]
    pub fn path_segment(&self) -> String {
        match &self.position {
            Position::Direct => format!(".{}", self.field),
            Position::Index(i) => format!(".{}[{i}]", self.field),
            Position::Key(key) => format!(".{}[{key}]", self.field),
        }
    }
}

#[derive(Debug, Clone)]
struct ObjectData {
    type_name: String,
    fields: IndexMap<String, Value>,
    frozen: bool,
}

/// Owns every model object of one build.
///
/// Objects reference each other through [`ObjectId`]s stored in
/// [`Value::Ref`], so arbitrary graphs (including cycles through owner and
/// link fields) can be expressed without shared ownership.
#[derive(Clone)]
pub struct ModelGraph {
    registry: Arc<TypeRegistry>,
    objects: Vec<ObjectData>,
    fired_hooks: HashSet<(ObjectId, String)>,
}

impl fmt::Debug for ModelGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelGraph")
            .field("types", &self.registry.len())
            .field("objects", &self.objects)
            .finish_non_exhaustive()
    }
}

impl ModelGraph {
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            objects: Vec::new(),
            fired_hooks: HashSet::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn shared_registry(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        id.index() < self.objects.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.objects.len()).map(ObjectId::new)
    }

    /// Create an object with every field at its initial value.
    ///
    /// Keyed types may be created without a key here; use
    /// [`create_with`](Self::create_with) to enforce construction parameters.
    ///
    /// # Errors
    ///
    /// Fails for unknown or abstract types.
    pub fn create(&mut self, type_name: &str) -> Result<ObjectId, SchemaError> {
        let model_type = self.registry.require(type_name)?;
        if model_type.is_abstract {
            return Err(SchemaError::AbstractInstantiation {
                type_name: type_name.to_string(),
            });
        }

        let fields = self
            .registry
            .fields_of(type_name)
            .into_iter()
            .map(|f| (f.name.clone(), f.initial_value()))
            .collect();
        let id = ObjectId::new(self.objects.len());
        self.objects.push(ObjectData {
            type_name: type_name.to_string(),
            fields,
            frozen: false,
        });
        trace!(id = %id, type_name, "Created model object");
        Ok(id)
    }

    /// Factory construction from named parameters.
    ///
    /// Keyed types require a non-empty key; unkeyed types reject one. Every
    /// other parameter must name a field of the type.
    ///
    /// # Errors
    ///
    /// Returns a schema error for parameter mismatches and a model error when
    /// a parameter value does not fit its field.
    pub fn create_with(
        &mut self,
        type_name: &str,
        params: AutoCreateParams,
    ) -> Result<ObjectId, BuildError> {
        self.registry.require(type_name)?;
        let key_field = self.registry.key_field(type_name).map(|f| f.name.clone());
        let key = params.key.filter(|k| !k.is_empty());
        match (&key_field, &key) {
            (Some(_), None) => {
                return Err(SchemaError::KeyRequired {
                    type_name: type_name.to_string(),
                }
                .into());
            }
            (None, Some(_)) => {
                return Err(SchemaError::UnexpectedKey {
                    type_name: type_name.to_string(),
                }
                .into());
            }
            _ => {}
        }
        if let Some(unknown) = params
            .fields
            .keys()
            .find(|name| self.registry.field(type_name, name).is_none())
        {
            return Err(SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field: unknown.clone(),
            }
            .into());
        }

        let id = self.create(type_name)?;
        if let (Some(field), Some(key)) = (key_field, key) {
            self.set(id, &field, key)?;
        }
        for (name, value) in params.fields {
            self.set(id, &name, value)?;
        }
        Ok(id)
    }

    /// Shorthand for [`create_with`](Self::create_with) with only a key.
    ///
    /// # Errors
    ///
    /// See [`create_with`](Self::create_with).
    pub fn create_keyed(
        &mut self,
        type_name: &str,
        key: impl Into<Value>,
    ) -> Result<ObjectId, BuildError> {
        self.create_with(type_name, AutoCreateParams::keyed(key))
    }

    fn object(&self, id: ObjectId) -> Result<&ObjectData, ModelError> {
        self.objects
            .get(id.index())
            .ok_or(ModelError::UnknownObject { id })
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut ObjectData, ModelError> {
        self.objects
            .get_mut(id.index())
            .ok_or(ModelError::UnknownObject { id })
    }

    /// Runtime type of an object.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownObject`] for ids from another graph.
    pub fn type_name(&self, id: ObjectId) -> Result<&str, ModelError> {
        Ok(&self.object(id)?.type_name)
    }

    /// Declaration of an object's runtime type.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownObject`] for ids from another graph.
    pub fn model_type(&self, id: ObjectId) -> Result<&ModelType, ModelError> {
        let name = self.type_name(id)?;
        self.registry
            .get(name)
            .ok_or_else(|| ModelError::UnknownObject { id })
    }

    /// Whether the object is an instance of `type_name` or one of its subtypes.
    #[must_use]
    pub fn is_instance(&self, id: ObjectId, type_name: &str) -> bool {
        self.type_name(id)
            .is_ok_and(|actual| self.registry.is_subtype(actual, type_name))
    }

    /// Descriptor of a field of the object's type.
    ///
    /// # Errors
    ///
    /// Fails for unknown objects or fields.
    pub fn descriptor(&self, id: ObjectId, field: &str) -> Result<&FieldDescriptor, ModelError> {
        let type_name = self.type_name(id)?;
        self.registry
            .field(type_name, field)
            .ok_or_else(|| ModelError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })
    }

    /// Current value of a field.
    ///
    /// # Errors
    ///
    /// Fails for unknown objects or fields.
    pub fn get(&self, id: ObjectId, field: &str) -> Result<&Value, ModelError> {
        let object = self.object(id)?;
        object
            .fields
            .get(field)
            .ok_or_else(|| ModelError::UnknownField {
                type_name: object.type_name.clone(),
                field: field.to_string(),
            })
    }

    /// Object referenced by a single-valued field, if any.
    ///
    /// # Errors
    ///
    /// Fails for unknown objects or fields.
    pub fn get_object(&self, id: ObjectId, field: &str) -> Result<Option<ObjectId>, ModelError> {
        Ok(self.get(id, field)?.as_object())
    }

    /// Owner assigned through the first owner field that is set, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownObject`] for ids from another graph.
    pub fn owner_of(&self, id: ObjectId) -> Result<Option<ObjectId>, ModelError> {
        let type_name = self.type_name(id)?;
        for field in self.registry.owner_fields(type_name) {
            if let Some(owner) = self.get(id, &field.name)?.as_object() {
                return Ok(Some(owner));
            }
        }
        Ok(None)
    }

    /// Assign a field.
    ///
    /// Structural fields of completed objects are read-only. Key and owner
    /// fields can be assigned once; re-assigning the same value is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] for unknown fields, values that do not fit the
    /// field, frozen objects, and key or owner reassignment.
    pub fn set(
        &mut self,
        id: ObjectId,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), ModelError> {
        let value = value.into();
        let registry = Arc::clone(&self.registry);
        let object = self.object(id)?;
        let descriptor = registry
            .field(&object.type_name, field)
            .ok_or_else(|| ModelError::UnknownField {
                type_name: object.type_name.clone(),
                field: field.to_string(),
            })?;

        self.check_writable(id, descriptor)?;
        self.check_value(id, descriptor, &value)?;
        let value = if value == Value::Empty {
            descriptor.initial_value()
        } else {
            value
        };

        let object = self.object(id)?;
        let current = object.fields.get(field).unwrap_or(&Value::Empty);
        if !current.is_empty() && *current != value {
            if descriptor.key {
                return Err(ModelError::KeyReassigned {
                    type_name: object.type_name.clone(),
                    field: field.to_string(),
                });
            }
            if descriptor.owner.is_some() {
                return Err(ModelError::OwnerReassigned {
                    type_name: object.type_name.clone(),
                    field: field.to_string(),
                });
            }
        }

        self.object_mut(id)?.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Append to a collection field.
    ///
    /// # Errors
    ///
    /// Fails when the field is not a collection or the element does not fit.
    pub fn push(
        &mut self,
        id: ObjectId,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), ModelError> {
        let value = value.into();
        let registry = Arc::clone(&self.registry);
        let descriptor = self.container_descriptor(&registry, id, field, FieldKind::Collection)?;
        self.check_writable(id, descriptor)?;
        self.check_element(id, descriptor, &value)?;

        let slot = self
            .object_mut(id)?
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        match slot {
            Value::List(items) => items.push(value),
            other => *other = Value::List(vec![value]),
        }
        Ok(())
    }

    /// Insert an entry into a mapping field.
    ///
    /// A keyed child whose key is still empty takes `key`; a keyed child
    /// with a different key is rejected so mapping keys always match the
    /// children's keys.
    ///
    /// # Errors
    ///
    /// Fails when the field is not a mapping, the key is already present, or
    /// the value does not fit.
    pub fn insert(
        &mut self,
        id: ObjectId,
        field: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ModelError> {
        let key = key.into();
        let value = value.into();
        let registry = Arc::clone(&self.registry);
        let descriptor = self.container_descriptor(&registry, id, field, FieldKind::Mapping)?;
        self.check_writable(id, descriptor)?;
        self.check_element(id, descriptor, &value)?;

        let type_name = self.type_name(id)?.to_string();
        if self
            .get(id, field)?
            .as_map()
            .is_some_and(|entries| entries.contains_key(&key))
        {
            return Err(ModelError::DuplicateKey {
                type_name,
                field: field.to_string(),
                key,
            });
        }

        if let Some(child) = value.as_object()
            && let Some(key_field) = registry.key_field(self.type_name(child)?)
        {
            match self.key_of(child)? {
                None => self.set(child, &key_field.name, key.as_str())?,
                Some(existing) if existing != key => {
                    return Err(ModelError::TypeMismatch {
                        type_name,
                        field: field.to_string(),
                        expected: format!("entry keyed '{key}'"),
                        found: format!("child keyed '{existing}'"),
                    });
                }
                Some(_) => {}
            }
        }

        let slot = self
            .object_mut(id)?
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Map(IndexMap::new()));
        match slot {
            Value::Map(entries) => {
                entries.insert(key, value);
            }
            other => *other = Value::Map(IndexMap::from([(key, value)])),
        }
        Ok(())
    }

    /// Insert a keyed child into a mapping under its own key.
    ///
    /// # Errors
    ///
    /// Fails when the child's type is unkeyed or its key is empty, plus
    /// everything [`insert`](Self::insert) can return.
    pub fn insert_keyed(
        &mut self,
        id: ObjectId,
        field: &str,
        child: ObjectId,
    ) -> Result<(), ModelError> {
        let child_type = self.type_name(child)?.to_string();
        if !self.registry.is_keyed(&child_type) {
            return Err(ModelError::UnkeyedType {
                type_name: child_type,
            });
        }
        let key = self
            .key_of(child)?
            .ok_or(ModelError::MissingKey {
                type_name: child_type,
            })?;
        self.insert(id, field, key, child)
    }

    /// Keys of a mapping field, in insertion order.
    ///
    /// # Errors
    ///
    /// Fails when the field is not a mapping.
    pub fn keys(&self, id: ObjectId, field: &str) -> Result<Vec<String>, ModelError> {
        match self.get(id, field)? {
            Value::Map(entries) => Ok(entries.keys().cloned().collect()),
            _ => Err(ModelError::KindMismatch {
                type_name: self.type_name(id)?.to_string(),
                field: field.to_string(),
                expected: FieldKind::Mapping.describe(),
            }),
        }
    }

    /// Rendered key of a keyed object; `None` when the type is unkeyed or
    /// the key is still empty.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownObject`] for ids from another graph.
    pub fn key_of(&self, id: ObjectId) -> Result<Option<String>, ModelError> {
        let type_name = self.type_name(id)?;
        let Some(key_field) = self.registry.key_field(type_name) else {
            return Ok(None);
        };
        Ok(self.get(id, &key_field.name)?.key_string())
    }

    /// Containment edges of an object in declaration order, collection
    /// elements by index and mapping entries in insertion order.
    ///
    /// Owner and link fields are not containment and are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownObject`] for ids from another graph.
    pub fn children(&self, id: ObjectId) -> Result<Vec<Edge>, ModelError> {
        let object = self.object(id)?;
        let mut edges = Vec::new();
        for descriptor in self.registry.fields_of(&object.type_name) {
            if !descriptor.is_containment() {
                continue;
            }
            let edge = |position, target| Edge {
                field: descriptor.name.clone(),
                position,
                target,
            };
            match object.fields.get(&descriptor.name) {
                Some(Value::Ref(target)) => edges.push(edge(Position::Direct, *target)),
                Some(Value::List(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        if let Value::Ref(target) = item {
                            edges.push(edge(Position::Index(i), *target));
                        }
                    }
                }
                Some(Value::Map(entries)) => {
                    for (key, item) in entries {
                        if let Value::Ref(target) = item {
                            edges.push(edge(Position::Key(key.clone()), *target));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(edges)
    }

    /// Make structural fields read-only.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownObject`] for ids from another graph.
    pub fn freeze(&mut self, id: ObjectId) -> Result<(), ModelError> {
        self.object_mut(id)?.frozen = true;
        Ok(())
    }

    #[must_use]
    pub fn is_frozen(&self, id: ObjectId) -> bool {
        self.objects.get(id.index()).is_some_and(|o| o.frozen)
    }

    /// Record that the named owner hook fired for `id`. Returns `false` when
    /// it had already fired.
    pub fn mark_owner_hook(&mut self, id: ObjectId, hook: &str) -> bool {
        self.fired_hooks.insert((id, hook.to_string()))
    }

    /// Short label such as `Server#3` or `Server#3(alpha)`.
    #[must_use]
    pub fn describe(&self, id: ObjectId) -> String {
        match (self.type_name(id), self.key_of(id)) {
            (Ok(type_name), Ok(Some(key))) => format!("{type_name}{id}({key})"),
            (Ok(type_name), _) => format!("{type_name}{id}"),
            (Err(_), _) => format!("?{id}"),
        }
    }

    fn container_descriptor<'r>(
        &self,
        registry: &'r TypeRegistry,
        id: ObjectId,
        field: &str,
        kind: FieldKind,
    ) -> Result<&'r FieldDescriptor, ModelError> {
        let type_name = self.type_name(id)?;
        let descriptor = registry
            .field(type_name, field)
            .ok_or_else(|| ModelError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })?;
        if descriptor.kind != kind {
            return Err(ModelError::KindMismatch {
                type_name: type_name.to_string(),
                field: field.to_string(),
                expected: kind.describe(),
            });
        }
        Ok(descriptor)
    }

    fn check_writable(&self, id: ObjectId, descriptor: &FieldDescriptor) -> Result<(), ModelError> {
        if descriptor.kind.is_structural() && self.is_frozen(id) {
            return Err(ModelError::Frozen {
                type_name: self.type_name(id)?.to_string(),
                field: descriptor.name.clone(),
            });
        }
        Ok(())
    }

    fn check_value(
        &self,
        id: ObjectId,
        descriptor: &FieldDescriptor,
        value: &Value,
    ) -> Result<(), ModelError> {
        match (descriptor.kind, value) {
            (_, Value::Empty) => Ok(()),
            (FieldKind::Scalar, Value::Scalar(_)) => Ok(()),
            (FieldKind::Single, Value::Ref(_)) => self.check_element(id, descriptor, value),
            (FieldKind::Collection, Value::List(items)) => items
                .iter()
                .try_for_each(|item| self.check_element(id, descriptor, item)),
            (FieldKind::Mapping, Value::Map(entries)) => entries
                .values()
                .try_for_each(|item| self.check_element(id, descriptor, item)),
            (kind, other) => Err(ModelError::TypeMismatch {
                type_name: self.type_name(id)?.to_string(),
                field: descriptor.name.clone(),
                expected: kind.describe().to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Elements of object-valued fields must reference instances of the
    /// declared type; elements of scalar containers must be scalars.
    fn check_element(
        &self,
        id: ObjectId,
        descriptor: &FieldDescriptor,
        value: &Value,
    ) -> Result<(), ModelError> {
        let mismatch = |expected: &str, found: String| -> Result<(), ModelError> {
            Err(ModelError::TypeMismatch {
                type_name: self.type_name(id)?.to_string(),
                field: descriptor.name.clone(),
                expected: expected.to_string(),
                found,
            })
        };
        match (descriptor.declared_type.as_deref(), value) {
            (Some(declared), Value::Ref(target)) => {
                let actual = self.type_name(*target)?;
                if self.registry.is_subtype(actual, declared) {
                    Ok(())
                } else {
                    mismatch(declared, actual.to_string())
                }
            }
            (Some(declared), other) => mismatch(declared, other.kind_name().to_string()),
            (None, Value::Scalar(_)) => Ok(()),
            (None, other) => mismatch("scalar", other.kind_name().to_string()),
        }
    }
}
