use std::fmt;
use std::rc::Rc;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::entity::{EntityRef, EntityType};
use crate::enumeration::EnumValue;
use crate::ids::Handle;
use crate::sync_list::SyncList;

/// A value as it travels over the remote object protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    Handle(Handle),
}

impl RemoteValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RemoteValue::Null)
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            RemoteValue::Handle(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RemoteValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used for remote flags such as `Posted` or `IsEmpty`.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            RemoteValue::Boolean(b) => Some(*b),
            RemoteValue::Integer(n) => Some(*n != 0),
            RemoteValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RemoteValue::Integer(n) => Some(*n),
            RemoteValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteValue::Null => "null",
            RemoteValue::Boolean(_) => "boolean",
            RemoteValue::Integer(_) => "integer",
            RemoteValue::Number(_) => "number",
            RemoteValue::Text(_) => "text",
            RemoteValue::Date(_) => "date",
            RemoteValue::Handle(_) => "handle",
        }
    }
}

impl fmt::Display for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteValue::Null => f.write_str("null"),
            RemoteValue::Boolean(b) => write!(f, "{b}"),
            RemoteValue::Integer(n) => write!(f, "{n}"),
            RemoteValue::Number(n) => write!(f, "{n}"),
            RemoteValue::Text(s) => f.write_str(s),
            RemoteValue::Date(d) => write!(f, "{d}"),
            RemoteValue::Handle(h) => write!(f, "{h}"),
        }
    }
}

/// A typed value held by an entity field or a query parameter.
#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    Guid(Uuid),
    Enum(EnumValue),
    Type(&'static EntityType),
    Entity(EntityRef),
    List(Vec<EntityRef>),
    SyncList(SyncList),
    /// A remote value that no typed conversion applied to.
    Remote(RemoteValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(g) => Some(*g),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Guid(_) => "guid",
            Value::Enum(_) => "enum",
            Value::Type(_) => "type",
            Value::Entity(_) => "entity",
            Value::List(_) => "list",
            Value::SyncList(_) => "sync list",
            Value::Remote(_) => "remote value",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b).is_eq(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Guid(a), Self::Guid(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Type(a), Self::Type(b)) => std::ptr::eq(*a, *b),
            (Self::Entity(a), Self::Entity(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Rc::ptr_eq(x, y))
            }
            (Self::SyncList(a), Self::SyncList(b)) => a == b,
            (Self::Remote(a), Self::Remote(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Date(d) => write!(f, "Date({d})"),
            Value::Guid(g) => write!(f, "Guid({g})"),
            Value::Enum(e) => write!(f, "Enum({e})"),
            Value::Type(t) => write!(f, "Type({})", t.name),
            Value::Entity(e) => match e.try_borrow() {
                Ok(entity) => write!(f, "Entity({})", entity.entity_type().name),
                Err(_) => f.write_str("Entity(<borrowed>)"),
            },
            Value::List(items) => write!(f, "List(len={})", items.len()),
            Value::SyncList(list) => write!(f, "SyncList({} commands)", list.commands().len()),
            Value::Remote(r) => write!(f, "Remote({r:?})"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Date(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Value::Enum(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_flags_accept_numeric_truthiness() {
        assert_eq!(RemoteValue::Boolean(true).as_boolean(), Some(true));
        assert_eq!(RemoteValue::Integer(0).as_boolean(), Some(false));
        assert_eq!(RemoteValue::Text("x".into()).as_boolean(), None);
    }

    #[test]
    fn integral_numbers_read_as_integers() {
        assert_eq!(RemoteValue::Number(3.0).as_integer(), Some(3));
        assert_eq!(RemoteValue::Number(3.5).as_integer(), None);
    }

    #[test]
    fn float_equality_is_total() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Integer(1), Value::Number(1.0));
    }
}
