pub mod configuration;
pub mod controller;
pub mod entity;
pub mod enumeration;
pub mod error;
pub mod ids;
pub mod registry;
pub mod sync_list;
pub mod value;

pub use configuration::{ConfigurationName, ConfigurationScope};
pub use controller::{Controller, ValueSource};
pub use entity::{
    ElementType, Entity, EntityKind, EntityRef, EntityType, Field, FieldDescriptor, FieldType,
    Reference, Rows,
};
pub use enumeration::{EnumType, EnumValue, Enumeration};
pub use error::CoreError;
pub use ids::Handle;
pub use registry::TypeRegistry;
pub use sync_list::{SyncCommand, SyncList};
pub use value::{RemoteValue, Value};

#[doc(hidden)]
pub use paste;
