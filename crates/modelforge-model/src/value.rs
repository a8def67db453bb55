use indexmap::IndexMap;
use serde::Serialize;

use modelforge_utils::types::ObjectId;

/// Value held by a field of a model object.
///
/// Maps keep insertion order, so iterating a mapping field yields entries in
/// the order they were inserted.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Nothing assigned yet.
    #[default]
    Empty,
    /// An opaque scalar; never descended into.
    Scalar(serde_json::Value),
    /// Reference to another model object.
    Ref(ObjectId),
    /// Ordered collection.
    List(Vec<Value>),
    /// Key-value mapping.
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Build a scalar from anything JSON-representable.
    #[must_use]
    pub fn scalar(value: impl Into<serde_json::Value>) -> Self {
        Self::Scalar(value.into())
    }

    /// Whether the value counts as "not filled in".
    ///
    /// True for [`Value::Empty`], JSON `null`, the empty string, and empty
    /// lists or maps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Scalar(serde_json::Value::Null) => true,
            Self::Scalar(serde_json::Value::String(s)) => s.is_empty(),
            Self::Scalar(_) | Self::Ref(_) => false,
            Self::List(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(v) => v.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Render a scalar as a mapping key. Strings are used verbatim, other
    /// scalars through their JSON text. Non-scalars have no key form.
    #[must_use]
    pub fn key_string(&self) -> Option<String> {
        match self {
            Self::Scalar(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Self::Scalar(serde_json::Value::Null) | Self::Scalar(serde_json::Value::String(_)) => {
                None
            }
            Self::Scalar(other) => Some(other.to_string()),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Scalar(_) => "scalar",
            Self::Ref(_) => "reference",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Ref(id)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Scalar(serde_json::Value::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Scalar(serde_json::Value::String(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Scalar(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Scalar(n.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Scalar(b.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

/// Named construction parameters handed to the factory by auto-create providers.
///
/// `key` is kept apart from the other fields: keyed types require it, unkeyed
/// types must not receive it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AutoCreateParams {
    pub key: Option<Value>,
    pub fields: IndexMap<String, Value>,
}

impl AutoCreateParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters for a keyed type, with no other fields.
    #[must_use]
    pub fn keyed(key: impl Into<Value>) -> Self {
        Self::new().key(key)
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}
