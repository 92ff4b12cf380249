//! Helpers over the global context object of a session.

use onebridge_core::{ConfigurationName, Handle, RemoteValue};

use crate::error::HostError;
use crate::traits::{RemoteHost, RemoteHostExt};

/// Member names of the remote object model.
pub mod names {
    pub const REF: &str = "Ref";
    pub const UUID: &str = "UUID";
    pub const IS_EMPTY: &str = "IsEmpty";
    pub const POSTED: &str = "Posted";
    pub const CODE: &str = "Code";
    pub const NUMBER: &str = "Number";
    pub const LINE_NUMBER: &str = "LineNumber";
    pub const ID: &str = "Id";

    pub const WRITE: &str = "Write";
    pub const GET_OBJECT: &str = "GetObject";
    pub const CREATE_ITEM: &str = "CreateItem";
    pub const CREATE_DOCUMENT: &str = "CreateDocument";
    pub const CREATE_RECORD_MANAGER: &str = "CreateRecordManager";

    pub const COUNT: &str = "Count";
    pub const GET: &str = "Get";
    pub const CLEAR: &str = "Clear";
    pub const ADD: &str = "Add";
    pub const INSERT: &str = "Insert";
    pub const DELETE: &str = "Delete";
    pub const MOVE: &str = "Move";

    pub const METADATA: &str = "Metadata";
    pub const FULL_NAME: &str = "FullName";
    pub const FIND: &str = "Find";
    pub const FIND_BY_TYPE: &str = "FindByType";
    pub const NAME: &str = "Name";

    pub const NEW_OBJECT: &str = "NewObject";
    pub const STRING: &str = "String";
    pub const TYPE: &str = "Type";
    pub const ENUMS: &str = "Enums";
    pub const INDEX_OF: &str = "IndexOf";
    pub const DOCUMENT_WRITE_MODE: &str = "DocumentWriteMode";

    pub const QUERY: &str = "Query";
    pub const TEXT: &str = "Text";
    pub const SET_PARAMETER: &str = "SetParameter";
    pub const EXECUTE: &str = "Execute";
    pub const SELECT: &str = "Select";
    pub const NEXT: &str = "Next";
}

/// Write mode passed to `Write` on non-register objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentWriteMode {
    Write,
    Posting,
    UndoPosting,
}

impl DocumentWriteMode {
    pub fn from_posting(posting: Option<bool>) -> Self {
        match posting {
            None => Self::Write,
            Some(true) => Self::Posting,
            Some(false) => Self::UndoPosting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Write => "Write",
            Self::Posting => "Posting",
            Self::UndoPosting => "UndoPosting",
        }
    }
}

/// Manager object for a configuration name, e.g. `Documents.Order`.
pub fn manager(host: &mut dyn RemoteHost, name: &ConfigurationName) -> Result<Handle, HostError> {
    let global = host.global();
    let collection = host.property_handle(global, name.scope.manager_collection())?;
    host.property_handle(collection, &name.name)
}

pub fn write_mode(
    host: &mut dyn RemoteHost,
    mode: DocumentWriteMode,
) -> Result<RemoteValue, HostError> {
    let global = host.global();
    let modes = host.property_handle(global, names::DOCUMENT_WRITE_MODE)?;
    host.get_property(modes, mode.as_str())
}

/// Construct a platform object, e.g. `NewObject("Query")`.
pub fn new_object(
    host: &mut dyn RemoteHost,
    type_name: &str,
    args: &[RemoteValue],
) -> Result<Handle, HostError> {
    let global = host.global();
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(RemoteValue::Text(type_name.to_string()));
    call_args.extend_from_slice(args);
    host.invoke_handle(global, names::NEW_OBJECT, &call_args)
}

/// String presentation of a remote value as computed by the platform.
pub fn string(host: &mut dyn RemoteHost, value: &RemoteValue) -> Result<String, HostError> {
    let global = host.global();
    match host.invoke(global, names::STRING, std::slice::from_ref(value))? {
        RemoteValue::Text(s) => Ok(s),
        other => Err(HostError::UnexpectedValue {
            member: names::STRING.to_string(),
            actual: other.kind(),
        }),
    }
}

pub fn metadata(host: &mut dyn RemoteHost) -> Result<Handle, HostError> {
    let global = host.global();
    host.property_handle(global, names::METADATA)
}

/// Full metadata name of the object a remote value belongs to.
pub fn full_name_of(host: &mut dyn RemoteHost, value: Handle) -> Result<String, HostError> {
    let metadata = host.invoke_handle(value, names::METADATA, &[])?;
    full_name(host, metadata)
}

/// Full metadata name for a remote type descriptor.
pub fn full_name_by_type(
    host: &mut dyn RemoteHost,
    type_value: &RemoteValue,
) -> Result<String, HostError> {
    let metadata_root = metadata(host)?;
    let metadata = host.invoke_handle(
        metadata_root,
        names::FIND_BY_TYPE,
        std::slice::from_ref(type_value),
    )?;
    full_name(host, metadata)
}

fn full_name(host: &mut dyn RemoteHost, metadata: Handle) -> Result<String, HostError> {
    match host.invoke(metadata, names::FULL_NAME, &[])? {
        RemoteValue::Text(s) => Ok(s),
        other => Err(HostError::UnexpectedValue {
            member: names::FULL_NAME.to_string(),
            actual: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posting_maps_to_write_mode() {
        assert_eq!(DocumentWriteMode::from_posting(None), DocumentWriteMode::Write);
        assert_eq!(DocumentWriteMode::from_posting(Some(true)).as_str(), "Posting");
        assert_eq!(DocumentWriteMode::from_posting(Some(false)).as_str(), "UndoPosting");
    }
}
