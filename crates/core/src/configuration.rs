use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const TABLE_SECTION_MARKER: &str = ".TabularSection.";

/// Backing category of an entity kind in the remote configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigurationScope {
    /// Dictionary-like reference data.
    Catalogs,
    /// Document-like records that may be posted.
    Documents,
    /// Register-like keyed records without a reference.
    InformationRegisters,
    /// Rows of a table section embedded in a parent record.
    TableSections,
}

impl ConfigurationScope {
    /// Name of the manager collection on the global context.
    pub fn manager_collection(&self) -> &'static str {
        match self {
            Self::Catalogs => "Catalogs",
            Self::Documents => "Documents",
            Self::InformationRegisters => "InformationRegisters",
            Self::TableSections => "TabularSections",
        }
    }

    /// Prefix used in full metadata names, e.g. `Document` in `Document.Order`.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Self::Catalogs => Some("Catalog"),
            Self::Documents => Some("Document"),
            Self::InformationRegisters => Some("InformationRegister"),
            Self::TableSections => None,
        }
    }

    pub fn has_reference(&self) -> bool {
        matches!(self, Self::Catalogs | Self::Documents)
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "Catalog" => Some(Self::Catalogs),
            "Document" => Some(Self::Documents),
            "InformationRegister" => Some(Self::InformationRegisters),
            _ => None,
        }
    }
}

/// Identifies the remote category and name backing an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationName {
    pub scope: ConfigurationScope,
    pub name: Cow<'static, str>,
}

impl ConfigurationName {
    pub const fn new(scope: ConfigurationScope, name: &'static str) -> Self {
        Self {
            scope,
            name: Cow::Borrowed(name),
        }
    }

    /// Parse a full metadata name such as `Catalog.Counterparties` or
    /// `Document.Order.TabularSection.Lines`.
    pub fn parse(full_name: &str) -> Result<Self, CoreError> {
        if full_name.contains(TABLE_SECTION_MARKER) {
            return Ok(Self {
                scope: ConfigurationScope::TableSections,
                name: Cow::Owned(full_name.to_string()),
            });
        }
        let (prefix, name) = full_name
            .split_once('.')
            .ok_or_else(|| CoreError::InvalidConfigurationName(full_name.to_string()))?;
        let scope = ConfigurationScope::from_prefix(prefix)
            .ok_or_else(|| CoreError::InvalidConfigurationName(full_name.to_string()))?;
        if name.is_empty() {
            return Err(CoreError::InvalidConfigurationName(full_name.to_string()));
        }
        Ok(Self {
            scope,
            name: Cow::Owned(name.to_string()),
        })
    }

    pub fn has_reference(&self) -> bool {
        self.scope.has_reference()
    }

    pub fn full_name(&self) -> String {
        match self.scope.prefix() {
            Some(prefix) => format!("{prefix}.{}", self.name),
            None => self.name.to_string(),
        }
    }
}

impl fmt::Display for ConfigurationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
