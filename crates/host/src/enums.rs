use std::collections::HashMap;

use onebridge_core::{EnumType, EnumValue, Handle, RemoteValue};

use crate::error::HostError;
use crate::global::names;
use crate::traits::{RemoteHost, RemoteHostExt};

/// Translates enumeration values through `Enums.<Name>` managers.
#[derive(Default)]
pub struct EnumMapper {
    managers: HashMap<&'static str, Handle>,
}

impl EnumMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_remote(
        &mut self,
        host: &mut dyn RemoteHost,
        value: EnumValue,
    ) -> Result<RemoteValue, HostError> {
        let manager = self.manager(host, value.enum_type)?;
        host.get_property(manager, value.variant())
    }

    pub fn from_remote(
        &mut self,
        host: &mut dyn RemoteHost,
        enum_type: EnumType,
        value: &RemoteValue,
    ) -> Result<EnumValue, HostError> {
        let manager = self.manager(host, enum_type)?;
        let index = host.invoke(manager, names::INDEX_OF, std::slice::from_ref(value))?;
        let index = index.as_integer().ok_or_else(|| HostError::UnexpectedValue {
            member: names::INDEX_OF.to_string(),
            actual: index.kind(),
        })?;
        match usize::try_from(index) {
            Ok(ordinal) if ordinal < enum_type.variants.len() => Ok(EnumValue { enum_type, ordinal }),
            _ => Err(HostError::UnknownEnumValue {
                enum_name: enum_type.name,
                index,
            }),
        }
    }

    fn manager(&mut self, host: &mut dyn RemoteHost, enum_type: EnumType) -> Result<Handle, HostError> {
        if let Some(manager) = self.managers.get(enum_type.name) {
            return Ok(*manager);
        }
        let global = host.global();
        let enums = host.property_handle(global, names::ENUMS)?;
        let manager = host.property_handle(enums, enum_type.name)?;
        self.managers.insert(enum_type.name, manager);
        Ok(manager)
    }
}
