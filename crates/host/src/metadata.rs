use std::collections::HashMap;
use std::rc::Rc;

use onebridge_core::{ConfigurationName, ConfigurationScope, RemoteValue};
use tracing::debug;

use crate::error::HostError;
use crate::global::{self, names};
use crate::traits::{RemoteHost, RemoteHostExt};

/// Requisite collections enumerated per scope, in platform order.
fn requisite_sections(scope: ConfigurationScope) -> &'static [&'static str] {
    match scope {
        ConfigurationScope::InformationRegisters => &["Dimensions", "Resources", "Attributes"],
        _ => &["Attributes"],
    }
}

/// Reads requisite lists from the remote metadata tree.
pub struct MetadataAccessor {
    cache: Option<HashMap<String, Rc<[String]>>>,
}

impl MetadataAccessor {
    pub fn new(cache: bool) -> Self {
        Self {
            cache: cache.then(HashMap::new),
        }
    }

    /// Ordered requisite names of a configuration object.
    pub fn requisite_names(
        &mut self,
        host: &mut dyn RemoteHost,
        name: &ConfigurationName,
    ) -> Result<Rc<[String]>, HostError> {
        let full_name = name.full_name();
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&full_name)) {
            return Ok(cached.clone());
        }

        let metadata = global::metadata(host)?;
        let collection = host.property_handle(metadata, name.scope.manager_collection())?;
        let object = host.invoke(
            collection,
            names::FIND,
            &[RemoteValue::Text(name.name.to_string())],
        )?;
        let object = object
            .as_handle()
            .ok_or_else(|| HostError::MetadataNotFound(full_name.clone()))?;

        let mut requisites = Vec::new();
        for section in requisite_sections(name.scope) {
            let items = host.property_handle(object, section)?;
            let count = host.invoke_count(items, names::COUNT)?;
            for i in 0..count {
                let item = host.invoke_handle(items, names::GET, &[RemoteValue::Integer(i as i64)])?;
                requisites.push(host.property_text(item, names::NAME)?);
            }
        }
        debug!(object = %full_name, count = requisites.len(), "loaded requisite names");

        let requisites: Rc<[String]> = requisites.into();
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(full_name, requisites.clone());
        }
        Ok(requisites)
    }
}

impl Default for MetadataAccessor {
    fn default() -> Self {
        Self::new(true)
    }
}
