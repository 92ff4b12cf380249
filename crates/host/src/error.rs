use onebridge_core::{CoreError, Handle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("remote call [{member}] on {target} failed: {message}")]
    CallFailed {
        target: Handle,
        member: String,
        message: String,
    },

    #[error("object {target} has no member [{member}]")]
    UnknownMember { target: Handle, member: String },

    #[error("invalid handle: {0}")]
    InvalidHandle(Handle),

    #[error("expected an object from [{member}], got {actual}")]
    NotAHandle { member: String, actual: &'static str },

    #[error("unexpected {actual} from [{member}]")]
    UnexpectedValue { member: String, actual: &'static str },

    #[error("metadata object not found: {0}")]
    MetadataNotFound(String),

    #[error("enum [{enum_name}] has no value with index {index}")]
    UnknownEnumValue { enum_name: &'static str, index: i64 },

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}
