use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration name: {0}")]
    InvalidConfigurationName(String),

    #[error("field [{field}] of [{entity}] expects {expected}, got {actual}")]
    FieldTypeMismatch {
        entity: &'static str,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("type [{entity}] has no field [{field}]")]
    UnknownField {
        entity: &'static str,
        field: String,
    },

    #[error("sync list index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),
}
