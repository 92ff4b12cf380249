use std::collections::HashMap;

use crate::configuration::ConfigurationName;
use crate::entity::{EntityKind, EntityType};

/// Maps configuration names and Rust type names to entity descriptors.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_name: HashMap<&'static str, &'static EntityType>,
    by_configuration: HashMap<String, &'static EntityType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: EntityKind>(&mut self) -> &mut Self {
        self.register_type(T::descriptor())
    }

    pub fn register_type(&mut self, entity_type: &'static EntityType) -> &mut Self {
        self.by_name.insert(entity_type.name, entity_type);
        if let Some(configuration) = &entity_type.configuration {
            self.by_configuration
                .insert(configuration.full_name(), entity_type);
        }
        self
    }

    /// Look up the entity type bound to a full configuration name such as
    /// `Catalog.Counterparties`.
    pub fn get_type_or_null(&self, configuration_name: &str) -> Option<&'static EntityType> {
        self.by_configuration.get(configuration_name).copied()
    }

    pub fn resolve(&self, configuration_name: &ConfigurationName) -> Option<&'static EntityType> {
        self.get_type_or_null(&configuration_name.full_name())
    }

    pub fn by_name(&self, name: &str) -> Option<&'static EntityType> {
        self.by_name.get(name).copied()
    }

    pub fn configuration_of<T: EntityKind>(&self) -> Option<&'static ConfigurationName> {
        T::descriptor().configuration.as_ref()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::ConfigurationScope;
    use crate::entity::tests::{Folder, Note};

    #[test]
    fn resolves_both_directions() {
        let mut registry = TypeRegistry::new();
        registry.register::<Folder>().register::<Note>();

        let folder = registry.get_type_or_null("Catalog.Folders").unwrap();
        assert_eq!(folder.name, "Folder");
        let name = ConfigurationName::new(ConfigurationScope::Catalogs, "Folders");
        assert!(std::ptr::eq(registry.resolve(&name).unwrap(), folder));
        assert_eq!(registry.configuration_of::<Folder>(), Some(&name));
        assert!(registry.by_name("Note").is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let registry = TypeRegistry::new();
        assert!(registry.get_type_or_null("Document.Missing").is_none());
        assert!(registry.configuration_of::<Note>().is_none());
    }
}
