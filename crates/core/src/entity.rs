use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::configuration::ConfigurationName;
use crate::controller::{Controller, ValueSource};
use crate::enumeration::{EnumType, Enumeration};
use crate::error::CoreError;
use crate::sync_list::SyncList;
use crate::value::Value;

/// Shared, mutable handle to an entity of any type.
pub type EntityRef = Rc<RefCell<dyn Entity>>;

/// Object-safe side of a typed entity.
pub trait Entity: Any {
    fn entity_type(&self) -> &'static EntityType;

    fn controller(&self) -> &Controller;

    fn controller_mut(&mut self) -> &mut Controller;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Entity {
    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Read a field through the descriptor table.
    pub fn get_field(&self, name: &str) -> Result<Value, CoreError> {
        let entity_type = self.entity_type();
        let field = entity_type
            .field(name)
            .ok_or_else(|| CoreError::UnknownField {
                entity: entity_type.name,
                field: name.to_string(),
            })?;
        Ok((field.get)(self))
    }

    /// Write a field through its generated setter, so change tracking applies.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), CoreError> {
        let entity_type = self.entity_type();
        let field = entity_type
            .field(name)
            .ok_or_else(|| CoreError::UnknownField {
                entity: entity_type.name,
                field: name.to_string(),
            })?;
        (field.set)(self, value)
    }
}

/// Static side of a typed entity.
pub trait EntityKind: Entity + Default + Sized {
    const NAME: &'static str;

    fn descriptor() -> &'static EntityType;

    fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    fn new_ref() -> EntityRef {
        Rc::new(RefCell::new(Self::default()))
    }
}

/// Element type of a list field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Entity(&'static str),
    Scalar(&'static str),
}

/// Declared type of an entity field; drives value marshalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Resolved at runtime from the remote value.
    Any,
    Boolean,
    Integer,
    Number,
    Text,
    Date,
    Guid,
    Enum(EnumType),
    /// A reference to an entity type descriptor.
    Type,
    /// A reference to an entity of the named type.
    Entity(&'static str),
    List(ElementType),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Enum(e) => write!(f, "enum {}", e.name),
            FieldType::Entity(name) => write!(f, "entity {name}"),
            FieldType::List(ElementType::Entity(name)) => write!(f, "list of {name}"),
            FieldType::List(ElementType::Scalar(name)) => write!(f, "list of {name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Typed accessor pair for one field of an entity type.
pub struct FieldDescriptor {
    /// Name of the requisite on the remote side.
    pub name: &'static str,
    pub field_type: FieldType,
    pub get: fn(&dyn Entity) -> Value,
    pub set: fn(&mut dyn Entity, Value) -> Result<(), CoreError>,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .finish()
    }
}

/// Descriptor table of an entity type, built once per type.
pub struct EntityType {
    pub name: &'static str,
    pub configuration: Option<ConfigurationName>,
    pub fields: Vec<FieldDescriptor>,
    pub allocate: fn() -> EntityRef,
}

impl EntityType {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn has_reference(&self) -> bool {
        self.configuration
            .as_ref()
            .is_some_and(ConfigurationName::has_reference)
    }

    /// Two-phase construction: a zero-value shell bound to a remote object.
    /// No field is read from the source.
    pub fn materialize(&self, source: ValueSource) -> EntityRef {
        let entity = (self.allocate)();
        entity.borrow_mut().controller_mut().bind(source);
        entity
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("configuration", &self.configuration)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Conversion between a Rust field type and a [`Value`].
pub trait Field: Sized {
    fn field_type() -> FieldType;

    fn to_value(&self) -> Value;

    /// On mismatch the rejected value is handed back.
    fn from_value(value: Value) -> Result<Self, Value>;
}

impl Field for bool {
    fn field_type() -> FieldType {
        FieldType::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(other),
        }
    }
}

impl Field for i64 {
    fn field_type() -> FieldType {
        FieldType::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Integer(n) => Ok(n),
            Value::Null => Ok(0),
            other => Err(other),
        }
    }
}

impl Field for f64 {
    fn field_type() -> FieldType {
        FieldType::Number
    }

    fn to_value(&self) -> Value {
        Value::Number(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Number(n) => Ok(n),
            Value::Integer(n) => Ok(n as f64),
            Value::Null => Ok(0.0),
            other => Err(other),
        }
    }
}

impl Field for String {
    fn field_type() -> FieldType {
        FieldType::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(other),
        }
    }
}

impl Field for Option<NaiveDateTime> {
    fn field_type() -> FieldType {
        FieldType::Date
    }

    fn to_value(&self) -> Value {
        self.map_or(Value::Null, Value::Date)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Date(d) => Ok(Some(d)),
            Value::Null => Ok(None),
            other => Err(other),
        }
    }
}

impl Field for Option<Uuid> {
    fn field_type() -> FieldType {
        FieldType::Guid
    }

    fn to_value(&self) -> Value {
        self.map_or(Value::Null, Value::Guid)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Guid(g) => Ok(Some(g)),
            Value::Null => Ok(None),
            other => Err(other),
        }
    }
}

impl<E: Enumeration> Field for Option<E> {
    fn field_type() -> FieldType {
        FieldType::Enum(E::TYPE)
    }

    fn to_value(&self) -> Value {
        self.map_or(Value::Null, |e| Value::Enum(e.to_enum_value()))
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Enum(ev) if ev.enum_type == E::TYPE => match E::from_ordinal(ev.ordinal) {
                Some(e) => Ok(Some(e)),
                None => Err(Value::Enum(ev)),
            },
            Value::Null => Ok(None),
            other => Err(other),
        }
    }
}

impl Field for Option<&'static EntityType> {
    fn field_type() -> FieldType {
        FieldType::Type
    }

    fn to_value(&self) -> Value {
        self.map_or(Value::Null, Value::Type)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Type(t) => Ok(Some(t)),
            Value::Null => Ok(None),
            other => Err(other),
        }
    }
}

/// Untyped fields keep whatever value the remote side produced.
impl Field for Value {
    fn field_type() -> FieldType {
        FieldType::Any
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        Ok(value)
    }
}

/// A single-entity reference field.
pub struct Reference<T> {
    entity: Option<EntityRef>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self {
            entity: None,
            _kind: PhantomData,
        }
    }
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: EntityKind> Reference<T> {
    pub fn new(entity: &Rc<RefCell<T>>) -> Self {
        let entity: EntityRef = entity.clone();
        Self::from_ref(entity)
    }

    pub fn from_ref(entity: EntityRef) -> Self {
        Self {
            entity: Some(entity),
            _kind: PhantomData,
        }
    }

    pub fn get(&self) -> Option<&EntityRef> {
        self.entity.as_ref()
    }

    pub fn is_none(&self) -> bool {
        self.entity.is_none()
    }

    /// Borrow the referenced entity as its concrete type.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let entity = self.entity.as_ref()?;
        let entity = entity.borrow();
        entity.downcast_ref::<T>().map(f)
    }
}

impl<T: EntityKind> Field for Reference<T> {
    fn field_type() -> FieldType {
        FieldType::Entity(T::NAME)
    }

    fn to_value(&self) -> Value {
        self.entity.clone().map_or(Value::Null, Value::Entity)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Entity(e) => {
                let matches = e
                    .try_borrow()
                    .map(|entity| entity.entity_type().name == T::NAME)
                    .unwrap_or(true);
                if matches {
                    Ok(Self::from_ref(e))
                } else {
                    Err(Value::Entity(e))
                }
            }
            Value::Null => Ok(Self::default()),
            other => Err(other),
        }
    }
}

#[derive(Clone)]
enum RowsInner {
    List(Vec<EntityRef>),
    Sync(SyncList),
}

/// A table-section field: either a list that replaces the whole section on
/// save, or a [`SyncList`] whose edits are replayed row by row.
pub struct Rows<T> {
    inner: RowsInner,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Default for Rows<T> {
    fn default() -> Self {
        Self {
            inner: RowsInner::List(Vec::new()),
            _kind: PhantomData,
        }
    }
}

impl<T> Clone for Rows<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: EntityKind> Rows<T> {
    pub fn from_items(items: Vec<EntityRef>) -> Self {
        Self {
            inner: RowsInner::List(items),
            _kind: PhantomData,
        }
    }

    pub fn synced(list: SyncList) -> Self {
        Self {
            inner: RowsInner::Sync(list),
            _kind: PhantomData,
        }
    }

    pub fn items(&self) -> &[EntityRef] {
        match &self.inner {
            RowsInner::List(items) => items,
            RowsInner::Sync(list) => list.items(),
        }
    }

    pub fn sync_list(&self) -> Option<&SyncList> {
        match &self.inner {
            RowsInner::Sync(list) => Some(list),
            RowsInner::List(_) => None,
        }
    }

    /// Continue editing the current rows with command logging.
    pub fn into_sync_list(self) -> SyncList {
        match self.inner {
            RowsInner::Sync(list) => list,
            RowsInner::List(items) => SyncList::from_items(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

impl<T: EntityKind> Field for Rows<T> {
    fn field_type() -> FieldType {
        FieldType::List(ElementType::Entity(T::NAME))
    }

    fn to_value(&self) -> Value {
        match &self.inner {
            RowsInner::List(items) => Value::List(items.clone()),
            RowsInner::Sync(list) => Value::SyncList(list.clone()),
        }
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::List(items) => Ok(Self::from_items(items)),
            Value::SyncList(list) => Ok(Self::synced(list)),
            Value::Null => Ok(Self::default()),
            other => Err(other),
        }
    }
}

/// Declare a typed entity together with its tracked setters and descriptor
/// table.
///
/// ```ignore
/// entity! {
///     pub struct Order: Documents("Order") {
///         id: Option<Uuid> = "Id",
///         number: String = "Number",
///         lines: Rows<OrderLine> = "Lines",
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    (@config) => {
        None
    };
    (@config $scope:ident $cname:literal) => {
        Some($crate::configuration::ConfigurationName::new(
            $crate::configuration::ConfigurationScope::$scope,
            $cname,
        ))
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident $(: $scope:ident ($cname:literal))? {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty = $remote:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Default)]
        $vis struct $name {
            controller: $crate::controller::Controller,
            $( $(#[$fmeta])* $field: $ty, )*
        }

        $crate::paste::paste! {
            impl $name {
                $(
                    pub fn $field(&self) -> &$ty {
                        &self.$field
                    }

                    pub fn [<set_ $field>](&mut self, value: $ty) {
                        self.controller
                            .record($remote, $crate::entity::Field::to_value(&value));
                        self.$field = value;
                    }
                )*
            }

            impl $crate::entity::Entity for $name {
                fn entity_type(&self) -> &'static $crate::entity::EntityType {
                    <Self as $crate::entity::EntityKind>::descriptor()
                }

                fn controller(&self) -> &$crate::controller::Controller {
                    &self.controller
                }

                fn controller_mut(&mut self) -> &mut $crate::controller::Controller {
                    &mut self.controller
                }

                fn as_any(&self) -> &dyn ::std::any::Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                    self
                }
            }

            impl $crate::entity::EntityKind for $name {
                const NAME: &'static str = stringify!($name);

                fn descriptor() -> &'static $crate::entity::EntityType {
                    static DESCRIPTOR: ::std::sync::OnceLock<$crate::entity::EntityType> =
                        ::std::sync::OnceLock::new();
                    DESCRIPTOR.get_or_init(|| $crate::entity::EntityType {
                        name: stringify!($name),
                        configuration: $crate::entity!(@config $($scope $cname)?),
                        fields: vec![
                            $(
                                $crate::entity::FieldDescriptor {
                                    name: $remote,
                                    field_type: <$ty as $crate::entity::Field>::field_type(),
                                    get: |entity| match entity.as_any().downcast_ref::<$name>() {
                                        Some(this) => $crate::entity::Field::to_value(&this.$field),
                                        None => $crate::value::Value::Null,
                                    },
                                    set: |entity, value| {
                                        let this = entity
                                            .as_any_mut()
                                            .downcast_mut::<$name>()
                                            .ok_or_else(|| $crate::error::CoreError::UnknownField {
                                                entity: stringify!($name),
                                                field: $remote.to_string(),
                                            })?;
                                        let typed = <$ty as $crate::entity::Field>::from_value(value)
                                            .map_err(|rejected| $crate::error::CoreError::FieldTypeMismatch {
                                                entity: stringify!($name),
                                                field: $remote,
                                                expected: <$ty as $crate::entity::Field>::field_type().to_string(),
                                                actual: rejected.kind().to_string(),
                                            })?;
                                        this.[<set_ $field>](typed);
                                        Ok(())
                                    },
                                },
                            )*
                        ],
                        allocate: || {
                            let entity: $crate::entity::EntityRef = ::std::rc::Rc::new(
                                ::std::cell::RefCell::new(<$name as ::std::default::Default>::default()),
                            );
                            entity
                        },
                    })
                }
            }
        }
    };
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::configuration::ConfigurationScope;
    use crate::ids::Handle;

    crate::entity! {
        pub struct Note {
            text: String = "Text",
        }
    }

    crate::entity! {
        pub struct Folder: Catalogs("Folders") {
            id: Option<Uuid> = "Id",
            title: String = "Description",
            parent: Reference<Folder> = "Parent",
            notes: Rows<Note> = "Notes",
        }
    }

    #[test]
    fn setters_record_changes() {
        let mut folder = Folder::default();
        folder.set_title("Inbox".into());
        assert_eq!(folder.title(), "Inbox");
        let log = folder.controller().changed().unwrap();
        assert_eq!(log, &[("Description".to_string(), Value::from("Inbox"))]);
    }

    #[test]
    fn descriptor_describes_fields() {
        let descriptor = Folder::descriptor();
        assert_eq!(descriptor.name, "Folder");
        assert_eq!(
            descriptor.configuration,
            Some(ConfigurationName::new(ConfigurationScope::Catalogs, "Folders"))
        );
        assert_eq!(descriptor.field("Parent").unwrap().field_type, FieldType::Entity("Folder"));
        assert_eq!(
            descriptor.field("Notes").unwrap().field_type,
            FieldType::List(ElementType::Entity("Note"))
        );
        assert!(descriptor.has_reference());
        assert!(!Note::descriptor().has_reference());
    }

    #[test]
    fn dynamic_access_goes_through_setters() {
        let folder: EntityRef = Folder::new_ref();
        folder
            .borrow_mut()
            .set_field("Description", Value::from("Archive"))
            .unwrap();
        let entity = folder.borrow();
        assert_eq!(entity.get_field("Description").unwrap(), Value::from("Archive"));
        assert!(entity.controller().is_changed("Description"));
        assert!(entity.get_field("Missing").is_err());
    }

    #[test]
    fn type_mismatch_is_reported() {
        let folder: EntityRef = Folder::new_ref();
        let err = folder
            .borrow_mut()
            .set_field("Description", Value::Integer(5))
            .unwrap_err();
        assert!(matches!(err, CoreError::FieldTypeMismatch { field: "Description", .. }));
    }

    #[test]
    fn materialize_binds_without_reading() {
        let entity = Folder::descriptor().materialize(ValueSource::read_only(Handle::from_raw(3)));
        let entity = entity.borrow();
        assert!(!entity.controller().is_new());
        assert!(!entity.controller().is_dirty());
        assert_eq!(
            entity.controller().value_source().map(|s| s.backing_handle()),
            Some(Handle::from_raw(3))
        );
        assert_eq!(entity.downcast_ref::<Folder>().unwrap().title(), "");
    }
}
