//! Model objects, their typed field descriptors, and the graph that owns them.
//!
//! Domain types are described once, up front, as [`ModelType`]s holding
//! [`FieldDescriptor`]s. The descriptors carry every role the build pipeline
//! cares about (key, owner, link, auto-create, default, validate), so the
//! pipeline never needs runtime reflection. Instances live in a
//! [`ModelGraph`] arena and are addressed by [`ObjectId`].

pub mod descriptor;
pub mod graph;
pub mod model_type;
pub mod registry;
pub mod value;

pub use descriptor::{
    AutoCreateSpec, DefaultSpec, FieldDescriptor, FieldKind, LinkSpec, LinkStrategy, OwnerScope,
    ValidateSpec,
};
pub use graph::{Edge, ModelGraph, Position};
pub use model_type::{AutoCreateCluster, ModelType, ObjectValidator, OwnerHook};
pub use registry::{TypeRegistry, TypeRegistryBuilder};
pub use value::{AutoCreateParams, Value};

pub use modelforge_utils::types::ObjectId;
