use std::fmt;
use std::sync::Arc;

use modelforge_utils::types::{ObjectId, Severity};

use crate::descriptor::{FieldDescriptor, ParamsProvider};
use crate::graph::ModelGraph;
use crate::value::AutoCreateParams;

/// Owner-hook callback: `(graph, object, owner)`.
pub type OwnerCallback =
    Arc<dyn Fn(&mut ModelGraph, ObjectId, ObjectId) -> anyhow::Result<()> + Send + Sync>;
/// Object-level validator; an `Err` is reported as a validation issue.
pub type ObjectCheck = Arc<dyn Fn(&ModelGraph, ObjectId) -> anyhow::Result<()> + Send + Sync>;
/// Per-object post-processing step.
pub type PostProcessCallback =
    Arc<dyn Fn(&mut ModelGraph, ObjectId) -> anyhow::Result<()> + Send + Sync>;
/// Selects the fields of a cluster.
pub type FieldFilter = Arc<dyn Fn(&FieldDescriptor) -> bool + Send + Sync>;

/// Callback taking a single owner. It participates in owner matching like a
/// direct owner field and fires at most once per object.
#[derive(Clone)]
pub struct OwnerHook {
    pub name: String,
    pub owner_type: String,
    pub callback: OwnerCallback,
}

impl OwnerHook {
    pub fn new<F>(name: impl Into<String>, owner_type: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut ModelGraph, ObjectId, ObjectId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            owner_type: owner_type.into(),
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for OwnerHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerHook")
            .field("name", &self.name)
            .field("owner_type", &self.owner_type)
            .finish_non_exhaustive()
    }
}

/// Whole-object validator, run after the field checks of its declaring type.
#[derive(Clone)]
pub struct ObjectValidator {
    pub name: String,
    pub severity: Severity,
    pub check: ObjectCheck,
}

impl ObjectValidator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&ModelGraph, ObjectId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            severity: Severity::Error,
            check: Arc::new(check),
        }
    }

    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Debug for ObjectValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValidator")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

/// One provider shared by several single-valued fields whose declared type
/// is a subtype of `supertype`. Each selected, still empty field gets its
/// own instance.
#[derive(Clone)]
pub struct AutoCreateCluster {
    pub supertype: String,
    pub filter: Option<FieldFilter>,
    pub provider: ParamsProvider,
}

impl AutoCreateCluster {
    pub fn new<F>(supertype: impl Into<String>, provider: F) -> Self
    where
        F: Fn() -> anyhow::Result<AutoCreateParams> + Send + Sync + 'static,
    {
        Self {
            supertype: supertype.into(),
            filter: None,
            provider: Arc::new(provider),
        }
    }

    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&FieldDescriptor) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for AutoCreateCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoCreateCluster")
            .field("supertype", &self.supertype)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish_non_exhaustive()
    }
}

/// Declaration of a model type.
///
/// Fields, hooks, validators and clusters declared here apply to this type
/// and every subtype. Supertype declarations come first wherever a
/// declaration order matters.
#[derive(Clone)]
pub struct ModelType {
    pub name: String,
    pub supertype: Option<String>,
    pub is_abstract: bool,
    pub fields: Vec<FieldDescriptor>,
    pub owner_hooks: Vec<OwnerHook>,
    pub validators: Vec<ObjectValidator>,
    pub clusters: Vec<AutoCreateCluster>,
    pub post_process: Vec<PostProcessCallback>,
}

impl ModelType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertype: None,
            is_abstract: false,
            fields: Vec::new(),
            owner_hooks: Vec::new(),
            validators: Vec::new(),
            clusters: Vec::new(),
            post_process: Vec::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.supertype = Some(supertype.into());
        self
    }

    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn owner_hook(mut self, hook: OwnerHook) -> Self {
        self.owner_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: ObjectValidator) -> Self {
        self.validators.push(validator);
        self
    }

    #[must_use]
    pub fn cluster(mut self, cluster: AutoCreateCluster) -> Self {
        self.clusters.push(cluster);
        self
    }

    #[must_use]
    pub fn post_process<F>(mut self, step: F) -> Self
    where
        F: Fn(&mut ModelGraph, ObjectId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.post_process.push(Arc::new(step));
        self
    }

    /// Field declared directly on this type (not inherited).
    #[must_use]
    pub fn own_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("supertype", &self.supertype)
            .field("is_abstract", &self.is_abstract)
            .field("fields", &self.fields)
            .field("owner_hooks", &self.owner_hooks)
            .field("validators", &self.validators)
            .field("clusters", &self.clusters)
            .field("post_process", &self.post_process.len())
            .finish()
    }
}
