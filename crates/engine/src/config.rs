use serde::Deserialize;

use crate::error::EngineError;

/// Tunables of a [`DataContext`](crate::DataContext).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// Keep requisite lists read from remote metadata for the lifetime of
    /// the context.
    pub cache_metadata: bool,
    /// Release query cursors as soon as a result sequence ends or is dropped.
    pub release_cursors: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_metadata: true,
            release_cursors: true,
        }
    }
}

impl ContextConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = ContextConfig::from_json(r#"{ "cache_metadata": false }"#).unwrap();
        assert!(!config.cache_metadata);
        assert!(config.release_cursors);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ContextConfig::from_json(r#"{ "timeout": 5 }"#).is_err());
    }
}
