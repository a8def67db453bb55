//! Typed field descriptors.
//!
//! A [`FieldDescriptor`] names a field, its kind, the model type it holds
//! (for object-valued fields), and the roles the build phases act on.

use std::fmt;
use std::sync::Arc;

use modelforge_utils::types::{ObjectId, Severity};

use crate::graph::ModelGraph;
use crate::value::{AutoCreateParams, Value};

/// Computes a link provider from the object being linked.
pub type LinkExpression = Arc<dyn Fn(&ModelGraph, ObjectId) -> Value + Send + Sync>;
/// Supplies construction parameters for an auto-created child.
pub type ParamsProvider = Arc<dyn Fn() -> anyhow::Result<AutoCreateParams> + Send + Sync>;
/// Supplies a default value.
pub type ValueProvider = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;
/// Field-level validation predicate; `true` means valid.
pub type ValuePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Shape of the value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Opaque value; never descended into.
    Scalar,
    /// At most one reference to a model object.
    Single,
    /// Ordered list of values.
    Collection,
    /// Insertion-ordered map from string keys to values.
    Mapping,
}

impl FieldKind {
    pub(crate) const fn describe(self) -> &'static str {
        match self {
            Self::Scalar => "a scalar field",
            Self::Single => "a single-valued field",
            Self::Collection => "a collection field",
            Self::Mapping => "a mapping field",
        }
    }

    /// Whether values of this kind can lead to other model objects.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

/// Which container an owner field receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnerScope {
    /// The object that directly contains this one.
    #[default]
    Direct,
    /// The nearest ancestor of the declared type.
    Transitive,
    /// The root of the build.
    Root,
}

/// Tie-breaker when both the instance name and the field name of a link
/// match different provider fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    InstanceName,
    FieldName,
}

/// How a link field finds its provider and the target field on it.
///
/// Provider selection, in priority order: `expression`, then
/// `ancestor_type`, then the object's owner (`owner_field` when several
/// owner fields exist). Target selection: `target_field`, then `tag`, then
/// name matching, then the single assignable field.
#[derive(Clone, Default)]
pub struct LinkSpec {
    pub expression: Option<LinkExpression>,
    pub ancestor_type: Option<String>,
    pub owner_field: Option<String>,
    pub target_field: Option<String>,
    pub tag: Option<String>,
    pub strategy: Option<LinkStrategy>,
}

impl LinkSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the provider from the linking object.
    #[must_use]
    pub fn expression<F>(mut self, expression: F) -> Self
    where
        F: Fn(&ModelGraph, ObjectId) -> Value + Send + Sync + 'static,
    {
        self.expression = Some(Arc::new(expression));
        self
    }

    /// Use the nearest ancestor of this type as the provider.
    #[must_use]
    pub fn ancestor(mut self, type_name: impl Into<String>) -> Self {
        self.ancestor_type = Some(type_name.into());
        self
    }

    #[must_use]
    pub fn owner_field(mut self, field: impl Into<String>) -> Self {
        self.owner_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn target(mut self, field: impl Into<String>) -> Self {
        self.target_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: LinkStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

impl fmt::Debug for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSpec")
            .field("expression", &self.expression.as_ref().map(|_| "<fn>"))
            .field("ancestor_type", &self.ancestor_type)
            .field("owner_field", &self.owner_field)
            .field("target_field", &self.target_field)
            .field("tag", &self.tag)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Auto-create role: a provider of construction parameters and, for
/// abstract declared types, the concrete type to instantiate.
#[derive(Clone)]
pub struct AutoCreateSpec {
    pub provider: ParamsProvider,
    pub concrete_type: Option<String>,
}

impl AutoCreateSpec {
    pub fn new<F>(provider: F) -> Self
    where
        F: Fn() -> anyhow::Result<AutoCreateParams> + Send + Sync + 'static,
    {
        Self {
            provider: Arc::new(provider),
            concrete_type: None,
        }
    }

    /// Auto-create with no parameters.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|| Ok(AutoCreateParams::new()))
    }

    #[must_use]
    pub fn concrete(mut self, type_name: impl Into<String>) -> Self {
        self.concrete_type = Some(type_name.into());
        self
    }
}

impl fmt::Debug for AutoCreateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoCreateSpec")
            .field("concrete_type", &self.concrete_type)
            .finish_non_exhaustive()
    }
}

/// Where a default value comes from.
#[derive(Clone)]
pub enum DefaultSpec {
    Value(Value),
    Provider(ValueProvider),
}

impl DefaultSpec {
    /// Produce the default value.
    ///
    /// # Errors
    ///
    /// Propagates provider failures.
    pub fn resolve(&self) -> anyhow::Result<Value> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Provider(provider) => provider(),
        }
    }
}

impl fmt::Debug for DefaultSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Provider(_) => f.write_str("Provider(<fn>)"),
        }
    }
}

/// Validate role. Without a predicate the field is checked for emptiness.
#[derive(Clone)]
pub struct ValidateSpec {
    pub severity: Severity,
    pub message: Option<String>,
    pub predicate: Option<ValuePredicate>,
}

impl Default for ValidateSpec {
    fn default() -> Self {
        Self {
            severity: Severity::Error,
            message: None,
            predicate: None,
        }
    }
}

impl ValidateSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `value` passes this check.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(value),
            None => !value.is_empty(),
        }
    }
}

impl fmt::Debug for ValidateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateSpec")
            .field("severity", &self.severity)
            .field("message", &self.message)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Typed descriptor of one field of a model type.
///
/// # Example
///
/// ```rust
/// use modelforge_model::{FieldDescriptor, LinkSpec, ValidateSpec};
///
/// let name = FieldDescriptor::scalar("name").key();
/// let parent = FieldDescriptor::single("parent", "Root").owner();
/// let pool = FieldDescriptor::single("pool", "Pool").link(LinkSpec::new().target("pool"));
/// let port = FieldDescriptor::scalar("port").validate(ValidateSpec::new().message("port is required"));
/// assert!(name.is_key());
/// assert!(parent.is_owner());
/// assert!(pool.is_link());
/// assert!(port.validate.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Model type held by object-valued fields (the element type for
    /// collections and mappings). `None` means the field holds scalars.
    pub declared_type: Option<String>,
    pub key: bool,
    pub owner: Option<OwnerScope>,
    pub link: Option<LinkSpec>,
    pub auto_create: Option<AutoCreateSpec>,
    pub default: Option<DefaultSpec>,
    pub validate: Option<ValidateSpec>,
    /// Tags for tag-based link target selection.
    pub source_tags: Vec<String>,
}

impl FieldDescriptor {
    fn with_kind(name: impl Into<String>, kind: FieldKind, declared: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            declared_type: declared,
            key: false,
            owner: None,
            link: None,
            auto_create: None,
            default: None,
            validate: None,
            source_tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Scalar, None)
    }

    /// Single reference to an object of `declared_type`.
    #[must_use]
    pub fn single(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Single, Some(declared_type.into()))
    }

    /// Ordered list of objects of `element_type`.
    #[must_use]
    pub fn collection(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Collection, Some(element_type.into()))
    }

    /// Ordered list of scalars.
    #[must_use]
    pub fn scalar_list(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Collection, None)
    }

    /// Keyed map of objects of `element_type`.
    #[must_use]
    pub fn mapping(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Mapping, Some(element_type.into()))
    }

    /// Map of scalars.
    #[must_use]
    pub fn scalar_map(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Mapping, None)
    }

    #[must_use]
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Owner role receiving the direct container.
    #[must_use]
    pub fn owner(self) -> Self {
        self.owner_scope(OwnerScope::Direct)
    }

    #[must_use]
    pub fn owner_scope(mut self, scope: OwnerScope) -> Self {
        self.owner = Some(scope);
        self
    }

    #[must_use]
    pub fn link(mut self, spec: LinkSpec) -> Self {
        self.link = Some(spec);
        self
    }

    #[must_use]
    pub fn auto_create(mut self, spec: AutoCreateSpec) -> Self {
        self.auto_create = Some(spec);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultSpec::Value(value.into()));
        self
    }

    #[must_use]
    pub fn default_with<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.default = Some(DefaultSpec::Provider(Arc::new(provider)));
        self
    }

    #[must_use]
    pub fn validate(mut self, spec: ValidateSpec) -> Self {
        self.validate = Some(spec);
        self
    }

    /// Shorthand for a non-empty check at error severity.
    #[must_use]
    pub fn required(self) -> Self {
        self.validate(ValidateSpec::new())
    }

    #[must_use]
    pub fn source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tags.push(tag.into());
        self
    }

    #[must_use]
    pub const fn is_key(&self) -> bool {
        self.key
    }

    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.owner.is_some()
    }

    #[must_use]
    pub const fn is_link(&self) -> bool {
        self.link.is_some()
    }

    /// Whether the walker follows this field. Owner and link fields point
    /// back up or across the graph and are not containment edges.
    #[must_use]
    pub const fn is_containment(&self) -> bool {
        self.kind.is_structural() && self.owner.is_none() && self.link.is_none()
    }

    /// The value a fresh object starts with for this field.
    #[must_use]
    pub fn initial_value(&self) -> Value {
        match self.kind {
            FieldKind::Scalar | FieldKind::Single => Value::Empty,
            FieldKind::Collection => Value::List(Vec::new()),
            FieldKind::Mapping => Value::Map(indexmap::IndexMap::new()),
        }
    }
}
