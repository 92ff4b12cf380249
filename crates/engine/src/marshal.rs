//! Conversion between remote values and typed values.

use chrono::{Datelike, NaiveDateTime, Timelike};
use onebridge_core::{ElementType, FieldType, RemoteValue, Value, ValueSource};
use onebridge_host::{global, names, RemoteHostExt};
use tracing::trace;
use uuid::Uuid;

use crate::error::EngineError;
use crate::session::Session;

/// The platform stores "no date" as midnight of 0100-01-01.
pub fn is_null_date(date: &NaiveDateTime) -> bool {
    date.year() == 100
        && date.month() == 1
        && date.day() == 1
        && date.hour() == 0
        && date.minute() == 0
        && date.second() == 0
        && date.nanosecond() == 0
}

fn invalid(expected: impl ToString, message: impl ToString) -> EngineError {
    EngineError::InvalidRemoteValue {
        expected: expected.to_string(),
        message: message.to_string(),
    }
}

impl Session<'_> {
    /// Convert a remote value into the typed form declared by `field_type`.
    pub fn map_from_remote(
        &mut self,
        value: RemoteValue,
        field_type: FieldType,
    ) -> Result<Value, EngineError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let field_type = match field_type {
            FieldType::Any => self.resolve_runtime_type(&value)?,
            other => other,
        };
        trace!(kind = value.kind(), declared = %field_type, "mapping remote value");

        match field_type {
            FieldType::Date => match value {
                RemoteValue::Date(date) if is_null_date(&date) => Ok(Value::Null),
                RemoteValue::Date(date) => Ok(Value::Date(date)),
                other => Err(invalid(field_type, format!("got {}", other.kind()))),
            },
            FieldType::Guid => {
                let text = global::string(self.host, &value)?;
                Uuid::parse_str(&text)
                    .map(Value::Guid)
                    .map_err(|e| invalid(field_type, e))
            }
            FieldType::Enum(enum_type) => {
                let handle = value
                    .as_handle()
                    .ok_or_else(|| invalid(field_type, format!("got {}", value.kind())))?;
                if self.host.invoke_bool(handle, names::IS_EMPTY, &[])? {
                    return Ok(Value::Null);
                }
                let mapped = self.enums.from_remote(self.host, enum_type, &value)?;
                Ok(Value::Enum(mapped))
            }
            FieldType::Type => {
                let full_name = global::full_name_by_type(self.host, &value)?;
                self.registry
                    .get_type_or_null(&full_name)
                    .map(Value::Type)
                    .ok_or(EngineError::UnknownRemoteType(full_name))
            }
            FieldType::Entity(name) => {
                let entity_type = self
                    .registry
                    .by_name(name)
                    .ok_or_else(|| EngineError::UnknownRemoteType(name.to_string()))?;
                let handle = value
                    .as_handle()
                    .ok_or_else(|| invalid(field_type, format!("got {}", value.kind())))?;
                if entity_type.has_reference()
                    && self.host.invoke_bool(handle, names::IS_EMPTY, &[])?
                {
                    return Ok(Value::Null);
                }
                Ok(Value::Entity(
                    entity_type.materialize(ValueSource::read_only(handle)),
                ))
            }
            FieldType::List(ElementType::Scalar(name)) => {
                Err(EngineError::UnsupportedListElementType(name.to_string()))
            }
            FieldType::List(ElementType::Entity(name)) => {
                let handle = value
                    .as_handle()
                    .ok_or_else(|| invalid(field_type, format!("got {}", value.kind())))?;
                let count = self.host.invoke_count(handle, names::COUNT)?;
                let mut items = Vec::with_capacity(count);
                for i in 0..count {
                    let item = self
                        .host
                        .invoke(handle, names::GET, &[RemoteValue::Integer(i as i64)])?;
                    match self.map_from_remote(item, FieldType::Entity(name))? {
                        Value::Entity(entity) => items.push(entity),
                        other => {
                            return Err(invalid(
                                field_type,
                                format!("element {i} is {}", other.kind()),
                            ));
                        }
                    }
                }
                Ok(Value::List(items))
            }
            FieldType::Boolean | FieldType::Integer | FieldType::Number | FieldType::Text => {
                Ok(coerce_scalar(value, field_type))
            }
            FieldType::Any => Ok(Value::Remote(value)),
        }
    }

    /// Convert a typed value into its remote form.
    pub fn map_to_remote(&mut self, value: &Value) -> Result<RemoteValue, EngineError> {
        match value {
            Value::Null => Ok(RemoteValue::Null),
            Value::Boolean(b) => Ok(RemoteValue::Boolean(*b)),
            Value::Integer(n) => Ok(RemoteValue::Integer(*n)),
            Value::Number(n) => Ok(RemoteValue::Number(*n)),
            Value::Text(s) => Ok(RemoteValue::Text(s.clone())),
            Value::Date(d) => Ok(RemoteValue::Date(*d)),
            Value::Guid(g) => {
                let handle = global::new_object(
                    self.host,
                    names::UUID,
                    &[RemoteValue::Text(g.to_string())],
                )?;
                Ok(RemoteValue::Handle(handle))
            }
            Value::Enum(e) => Ok(self.enums.to_remote(self.host, *e)?),
            Value::Type(entity_type) => {
                let configuration = entity_type
                    .configuration
                    .as_ref()
                    .filter(|c| c.has_reference())
                    .ok_or_else(|| invalid("type", format!("[{}] has no reference type", entity_type.name)))?;
                let prefix = configuration.scope.prefix().unwrap_or_default();
                let global = self.host.global();
                Ok(self.host.invoke(
                    global,
                    names::TYPE,
                    &[RemoteValue::Text(format!("{prefix}Ref.{}", configuration.name))],
                )?)
            }
            Value::Entity(entity) => {
                let entity = entity.borrow();
                entity
                    .controller()
                    .value_source()
                    .map(|source| RemoteValue::Handle(source.backing_handle()))
                    .ok_or(EngineError::UnsavedReference(entity.entity_type().name))
            }
            Value::List(_) | Value::SyncList(_) => {
                Err(invalid("scalar", "lists have no remote scalar form"))
            }
            Value::Remote(remote) => Ok(remote.clone()),
        }
    }

    /// Determine the declared type of an untyped value from the remote side.
    fn resolve_runtime_type(&mut self, value: &RemoteValue) -> Result<FieldType, EngineError> {
        Ok(match value {
            RemoteValue::Handle(handle) => {
                let full_name = global::full_name_of(self.host, *handle)?;
                let entity_type = self
                    .registry
                    .get_type_or_null(&full_name)
                    .ok_or(EngineError::UnknownRemoteType(full_name))?;
                FieldType::Entity(entity_type.name)
            }
            RemoteValue::Boolean(_) => FieldType::Boolean,
            RemoteValue::Integer(_) => FieldType::Integer,
            RemoteValue::Number(_) => FieldType::Number,
            RemoteValue::Text(_) => FieldType::Text,
            RemoteValue::Date(_) => FieldType::Date,
            RemoteValue::Null => FieldType::Any,
        })
    }
}

/// Standard numeric/string coercion; unconvertible values pass through.
fn coerce_scalar(value: RemoteValue, target: FieldType) -> Value {
    match (target, value) {
        (FieldType::Boolean, RemoteValue::Boolean(b)) => Value::Boolean(b),
        (FieldType::Boolean, RemoteValue::Integer(n)) => Value::Boolean(n != 0),
        (FieldType::Boolean, RemoteValue::Number(n)) => Value::Boolean(n != 0.0),
        (FieldType::Boolean, RemoteValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => Value::Remote(RemoteValue::Text(s)),
        },

        (FieldType::Integer, RemoteValue::Integer(n)) => Value::Integer(n),
        (FieldType::Integer, RemoteValue::Number(n)) if n.is_finite() => {
            Value::Integer(n.round_ties_even() as i64)
        }
        (FieldType::Integer, RemoteValue::Boolean(b)) => Value::Integer(i64::from(b)),
        (FieldType::Integer, RemoteValue::Text(s)) => match s.trim().parse::<i64>() {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::Remote(RemoteValue::Text(s)),
        },

        (FieldType::Number, RemoteValue::Number(n)) => Value::Number(n),
        (FieldType::Number, RemoteValue::Integer(n)) => Value::Number(n as f64),
        (FieldType::Number, RemoteValue::Boolean(b)) => Value::Number(if b { 1.0 } else { 0.0 }),
        (FieldType::Number, RemoteValue::Text(s)) => match s.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Remote(RemoteValue::Text(s)),
        },

        (FieldType::Text, RemoteValue::Text(s)) => Value::Text(s),
        (FieldType::Text, RemoteValue::Integer(n)) => Value::Text(n.to_string()),
        (FieldType::Text, RemoteValue::Number(n)) => Value::Text(n.to_string()),
        (FieldType::Text, RemoteValue::Boolean(b)) => Value::Text(b.to_string()),
        (FieldType::Text, RemoteValue::Date(d)) => Value::Text(d.to_string()),

        (_, other) => Value::Remote(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn null_date_sentinel_is_exact() {
        assert!(is_null_date(&date(100, 1, 1)));
        assert!(!is_null_date(&date(100, 1, 2)));
        assert!(!is_null_date(&date(2024, 1, 1)));
        let with_time = NaiveDate::from_ymd_opt(100, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 1))
            .unwrap();
        assert!(!is_null_date(&with_time));
    }

    #[test]
    fn scalars_coerce_like_standard_conversion() {
        assert_eq!(
            coerce_scalar(RemoteValue::Number(2.5), FieldType::Integer),
            Value::Integer(2)
        );
        assert_eq!(
            coerce_scalar(RemoteValue::Number(3.5), FieldType::Integer),
            Value::Integer(4)
        );
        assert_eq!(
            coerce_scalar(RemoteValue::Integer(7), FieldType::Text),
            Value::Text("7".into())
        );
        assert_eq!(
            coerce_scalar(RemoteValue::Text(" 12 ".into()), FieldType::Integer),
            Value::Integer(12)
        );
        assert_eq!(
            coerce_scalar(RemoteValue::Integer(0), FieldType::Boolean),
            Value::Boolean(false)
        );
    }

    #[test]
    fn unconvertible_values_pass_through() {
        assert_eq!(
            coerce_scalar(RemoteValue::Text("abc".into()), FieldType::Number),
            Value::Remote(RemoteValue::Text("abc".into()))
        );
        let date = date(2020, 5, 1);
        assert_eq!(
            coerce_scalar(RemoteValue::Date(date), FieldType::Integer),
            Value::Remote(RemoteValue::Date(date))
        );
    }
}
