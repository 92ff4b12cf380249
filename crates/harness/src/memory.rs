//! An in-memory stand-in for the remote platform.
//!
//! `MemoryHost` keeps every remote object in an arena indexed by handle and
//! answers the subset of the object model the engine drives: manager
//! collections, records and references, table sections, metadata, enums,
//! write modes and queries with canned results. Every call is logged so tests
//! can assert on the exact remote traffic.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use onebridge_core::{ConfigurationName, ConfigurationScope, Handle, RemoteValue};
use onebridge_host::{HostError, RemoteHost, names};
use uuid::Uuid;

/// Requisites of one configuration object as its metadata lists them.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub dimensions: Vec<String>,
    pub resources: Vec<String>,
    pub attributes: Vec<String>,
    pub table_sections: Vec<String>,
}

impl ObjectSchema {
    pub fn attributes(attributes: &[&str]) -> Self {
        Self {
            attributes: owned(attributes),
            ..Self::default()
        }
    }

    pub fn with_table_section(mut self, name: &str) -> Self {
        self.table_sections.push(name.to_string());
        self
    }

    pub fn register(dimensions: &[&str], resources: &[&str], attributes: &[&str]) -> Self {
        Self {
            dimensions: owned(dimensions),
            resources: owned(resources),
            attributes: owned(attributes),
            table_sections: Vec::new(),
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// One remote call as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Invoke(String),
    Get(String),
    Set(String),
}

/// A committed `Write` call.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub object: String,
    pub handle: Handle,
    pub argument: RemoteValue,
}

type Row = Vec<(String, RemoteValue)>;

struct Record {
    name: ConfigurationName,
    properties: BTreeMap<String, RemoteValue>,
    sections: HashMap<String, Handle>,
    reference: Option<Handle>,
}

impl Record {
    fn new(name: ConfigurationName) -> Self {
        Self {
            name,
            properties: BTreeMap::new(),
            sections: HashMap::new(),
            reference: None,
        }
    }
}

struct Reference {
    full_name: String,
    uuid: Uuid,
    object: Option<Handle>,
}

enum Object {
    Global,
    Managers(ConfigurationScope),
    Manager(ConfigurationName),
    Record(Record),
    Reference(Reference),
    Uuid(Uuid),
    Section { row_name: String, rows: Vec<Handle> },
    MetadataRoot,
    MetadataCollection(ConfigurationScope),
    MetadataObject(String),
    MetadataList(Vec<String>),
    MetadataItem(String),
    ValueList(Vec<Handle>),
    EnumsRoot,
    EnumManager(String),
    EnumValue { ordinal: Option<usize> },
    WriteModes,
    TypeDescriptor(String),
    Query { text: String },
    QueryResult(Vec<Row>),
    Selection { rows: Vec<Row>, position: Option<usize> },
}

impl Object {
    fn kind(&self) -> &'static str {
        match self {
            Object::Global => "global context",
            Object::Managers(_) => "manager collection",
            Object::Manager(_) => "manager",
            Object::Record(_) => "record",
            Object::Reference(_) => "reference",
            Object::Uuid(_) => "uuid",
            Object::Section { .. } => "table section",
            Object::MetadataRoot => "metadata",
            Object::MetadataCollection(_) => "metadata collection",
            Object::MetadataObject(_) => "metadata object",
            Object::MetadataList(_) => "metadata list",
            Object::MetadataItem(_) => "metadata item",
            Object::ValueList(_) => "value list",
            Object::EnumsRoot => "enums",
            Object::EnumManager(_) => "enum manager",
            Object::EnumValue { .. } => "enum value",
            Object::WriteModes => "document write modes",
            Object::TypeDescriptor(_) => "type",
            Object::Query { .. } => "query",
            Object::QueryResult(_) => "query result",
            Object::Selection { .. } => "selection",
        }
    }
}

const SCOPES: [ConfigurationScope; 3] = [
    ConfigurationScope::Catalogs,
    ConfigurationScope::Documents,
    ConfigurationScope::InformationRegisters,
];

fn scope_by_collection(name: &str) -> Option<ConfigurationScope> {
    SCOPES.into_iter().find(|s| s.manager_collection() == name)
}

fn configuration_name(scope: ConfigurationScope, name: &str) -> ConfigurationName {
    ConfigurationName {
        scope,
        name: Cow::Owned(name.to_string()),
    }
}

fn integer_arg(member: &str, args: &[RemoteValue], position: usize) -> Result<i64, HostError> {
    args.get(position)
        .and_then(RemoteValue::as_integer)
        .ok_or_else(|| HostError::UnexpectedValue {
            member: member.to_string(),
            actual: args.get(position).map_or("nothing", RemoteValue::kind),
        })
}

fn text_arg<'a>(member: &str, args: &'a [RemoteValue], position: usize) -> Result<&'a str, HostError> {
    args.get(position)
        .and_then(RemoteValue::as_text)
        .ok_or_else(|| HostError::UnexpectedValue {
            member: member.to_string(),
            actual: args.get(position).map_or("nothing", RemoteValue::kind),
        })
}

/// Simulated platform session.
pub struct MemoryHost {
    objects: Vec<Object>,
    schemas: HashMap<String, ObjectSchema>,
    enums: HashMap<String, Vec<String>>,
    queries: HashMap<String, Vec<Row>>,
    cache: HashMap<String, Handle>,
    failures: HashMap<String, String>,
    calls: Vec<Call>,
    writes: Vec<WriteRecord>,
    released: Vec<Handle>,
    register_records: HashMap<String, Vec<Handle>>,
    parameters: Vec<(String, RemoteValue)>,
    next_number: u64,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            objects: vec![Object::Global],
            schemas: HashMap::new(),
            enums: HashMap::new(),
            queries: HashMap::new(),
            cache: HashMap::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
            writes: Vec::new(),
            released: Vec::new(),
            register_records: HashMap::new(),
            parameters: Vec::new(),
            next_number: 1,
        }
    }

    /// Declare a configuration object, e.g. `Catalog.Counterparties`.
    pub fn with_object(mut self, full_name: &str, schema: ObjectSchema) -> Self {
        self.schemas.insert(full_name.to_string(), schema);
        self
    }

    pub fn with_enum(mut self, name: &str, variants: &[&str]) -> Self {
        self.enums.insert(name.to_string(), owned(variants));
        self
    }

    /// Rows returned when a query with exactly `text` is executed.
    pub fn set_query_result(&mut self, text: &str, rows: Vec<Vec<(&str, RemoteValue)>>) {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
            .collect();
        self.queries.insert(text.to_string(), rows);
    }

    /// Make every invocation of, or assignment to, `member` fail with
    /// `message`. Property reads are not affected.
    pub fn fail_on(&mut self, member: &str, message: &str) {
        self.failures.insert(member.to_string(), message.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Number of invocations of `method`.
    pub fn invoked(&self, method: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Invoke(m) if m == method))
            .count()
    }

    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    pub fn released(&self) -> &[Handle] {
        &self.released
    }

    pub fn last_parameters(&self) -> &[(String, RemoteValue)] {
        &self.parameters
    }

    pub fn reset_log(&mut self) {
        self.calls.clear();
        self.writes.clear();
        self.released.clear();
    }

    /// Store a record as if it had been written earlier. Returns the
    /// reference for reference kinds and the record itself otherwise.
    pub fn insert_record(&mut self, full_name: &str, properties: Vec<(&str, RemoteValue)>) -> Result<Handle, HostError> {
        let name = ConfigurationName::parse(full_name)?;
        let mut record = Record::new(name.clone());
        for (key, value) in properties {
            record.properties.insert(key.to_string(), value);
        }
        let handle = self.alloc(Object::Record(record));
        if name.has_reference() {
            let reference = self.alloc(Object::Reference(Reference {
                full_name: full_name.to_string(),
                uuid: Uuid::new_v4(),
                object: Some(handle),
            }));
            self.record_mut(handle)?.reference = Some(reference);
            return Ok(reference);
        }
        self.register_records
            .entry(full_name.to_string())
            .or_default()
            .push(handle);
        Ok(handle)
    }

    /// Committed records of a register, in write order.
    pub fn register_records(&self, full_name: &str) -> &[Handle] {
        self.register_records
            .get(full_name)
            .map_or(&[], Vec::as_slice)
    }

    /// Read a property without logging the call. References are followed
    /// to their record.
    pub fn property(&self, handle: Handle, name: &str) -> Option<RemoteValue> {
        let record = self.resolve_record(handle)?;
        if let Some(section) = record.sections.get(name) {
            return Some(RemoteValue::Handle(*section));
        }
        record.properties.get(name).cloned()
    }

    /// Rows of a table section of the record behind `handle`.
    pub fn section_rows(&self, handle: Handle, section: &str) -> Vec<Handle> {
        let Some(record) = self.resolve_record(handle) else {
            return Vec::new();
        };
        match record.sections.get(section).and_then(|h| self.object(*h).ok()) {
            Some(Object::Section { rows, .. }) => rows.clone(),
            _ => Vec::new(),
        }
    }

    pub fn uuid_of(&self, reference: Handle) -> Option<Uuid> {
        match self.object(reference).ok()? {
            Object::Reference(r) => Some(r.uuid),
            Object::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// The empty reference of a catalog or document.
    pub fn empty_ref(&mut self, full_name: &str) -> Handle {
        self.alloc(Object::Reference(Reference {
            full_name: full_name.to_string(),
            uuid: Uuid::nil(),
            object: None,
        }))
    }

    /// Handle of an enumeration value, as `Enums.<name>.<variant>` returns it.
    pub fn enum_value(&mut self, enum_name: &str, variant: &str) -> Result<Handle, HostError> {
        let global = self.global();
        let enums = Self::expect_handle(self.read(global, names::ENUMS)?)?;
        let manager = Self::expect_handle(self.read(enums, enum_name)?)?;
        Self::expect_handle(self.read(manager, variant)?)
    }

    /// A plain indexed collection of object handles.
    pub fn value_list(&mut self, items: Vec<Handle>) -> Handle {
        self.alloc(Object::ValueList(items))
    }

    /// Handle of a platform UUID object.
    pub fn uuid_object(&mut self, uuid: Uuid) -> Handle {
        self.alloc(Object::Uuid(uuid))
    }

    fn alloc(&mut self, object: Object) -> Handle {
        self.objects.push(object);
        Handle::from_raw(self.objects.len() as u64)
    }

    fn index(handle: Handle) -> Option<usize> {
        usize::try_from(handle.as_raw()).ok()?.checked_sub(1)
    }

    fn object(&self, handle: Handle) -> Result<&Object, HostError> {
        Self::index(handle)
            .and_then(|i| self.objects.get(i))
            .ok_or(HostError::InvalidHandle(handle))
    }

    fn object_mut(&mut self, handle: Handle) -> Result<&mut Object, HostError> {
        Self::index(handle)
            .and_then(|i| self.objects.get_mut(i))
            .ok_or(HostError::InvalidHandle(handle))
    }

    fn record_mut(&mut self, handle: Handle) -> Result<&mut Record, HostError> {
        match self.object_mut(handle)? {
            Object::Record(record) => Ok(record),
            _ => Err(HostError::InvalidHandle(handle)),
        }
    }

    fn resolve_record(&self, handle: Handle) -> Option<&Record> {
        match self.object(handle).ok()? {
            Object::Record(record) => Some(record),
            Object::Reference(Reference {
                object: Some(object),
                ..
            }) => match self.object(*object).ok()? {
                Object::Record(record) => Some(record),
                _ => None,
            },
            _ => None,
        }
    }

    fn expect_handle(value: RemoteValue) -> Result<Handle, HostError> {
        value.as_handle().ok_or_else(|| HostError::NotAHandle {
            member: "fixture".to_string(),
            actual: value.kind(),
        })
    }

    fn cached(&mut self, key: String, make: impl FnOnce() -> Object) -> Handle {
        if let Some(handle) = self.cache.get(&key) {
            return *handle;
        }
        let handle = self.alloc(make());
        self.cache.insert(key, handle);
        handle
    }

    fn unknown(target: Handle, member: &str) -> HostError {
        HostError::UnknownMember {
            target,
            member: member.to_string(),
        }
    }

    fn check_failure(&self, target: Handle, member: &str) -> Result<(), HostError> {
        match self.failures.get(member) {
            Some(message) => Err(HostError::CallFailed {
                target,
                member: member.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn read(&mut self, target: Handle, name: &str) -> Result<RemoteValue, HostError> {
        let handle = match self.object(target)? {
            Object::Global => match name {
                names::METADATA => self.cached("metadata".into(), || Object::MetadataRoot),
                names::ENUMS => self.cached("enums".into(), || Object::EnumsRoot),
                names::DOCUMENT_WRITE_MODE => self.cached("write-modes".into(), || Object::WriteModes),
                _ => {
                    let scope = scope_by_collection(name).ok_or_else(|| Self::unknown(target, name))?;
                    self.cached(format!("managers:{name}"), || Object::Managers(scope))
                }
            },
            Object::Managers(scope) => {
                let name = configuration_name(*scope, name);
                if !self.schemas.contains_key(&name.full_name()) {
                    return Err(Self::unknown(target, &name.name));
                }
                self.cached(format!("manager:{name}"), || Object::Manager(name))
            }
            Object::Manager(configuration) => {
                if name != "EmptyRef" || !configuration.has_reference() {
                    return Err(Self::unknown(target, name));
                }
                let full_name = configuration.full_name();
                self.empty_ref(&full_name)
            }
            Object::Record(record) => {
                if name == names::REF {
                    return Ok(record.reference.map_or(RemoteValue::Null, RemoteValue::Handle));
                }
                if let Some(section) = record.sections.get(name) {
                    return Ok(RemoteValue::Handle(*section));
                }
                let full_name = record.name.full_name();
                let is_section = self
                    .schemas
                    .get(&full_name)
                    .is_some_and(|s| s.table_sections.iter().any(|t| t == name));
                if !is_section {
                    return Ok(record.properties.get(name).cloned().unwrap_or(RemoteValue::Null));
                }
                let section = self.alloc(Object::Section {
                    row_name: format!("{full_name}.TabularSection.{name}"),
                    rows: Vec::new(),
                });
                self.record_mut(target)?.sections.insert(name.to_string(), section);
                section
            }
            Object::Reference(reference) => {
                if name == names::REF {
                    return Ok(RemoteValue::Handle(target));
                }
                match reference.object {
                    Some(object) => return self.read(object, name),
                    None => return Ok(RemoteValue::Null),
                }
            }
            Object::MetadataRoot => {
                let scope = scope_by_collection(name).ok_or_else(|| Self::unknown(target, name))?;
                self.alloc(Object::MetadataCollection(scope))
            }
            Object::MetadataObject(full_name) => {
                let schema = self
                    .schemas
                    .get(full_name)
                    .ok_or_else(|| HostError::MetadataNotFound(full_name.clone()))?;
                let list = match name {
                    "Dimensions" => schema.dimensions.clone(),
                    "Resources" => schema.resources.clone(),
                    "Attributes" => schema.attributes.clone(),
                    "TabularSections" => schema.table_sections.clone(),
                    _ => return Err(Self::unknown(target, name)),
                };
                self.alloc(Object::MetadataList(list))
            }
            Object::MetadataItem(item) => {
                if name != names::NAME {
                    return Err(Self::unknown(target, name));
                }
                return Ok(RemoteValue::Text(item.clone()));
            }
            Object::EnumsRoot => {
                if !self.enums.contains_key(name) {
                    return Err(Self::unknown(target, name));
                }
                let enum_name = name.to_string();
                self.cached(format!("enum:{name}"), || Object::EnumManager(enum_name))
            }
            Object::EnumManager(enum_name) => {
                let enum_name = enum_name.clone();
                let ordinal = if name == "EmptyRef" {
                    None
                } else {
                    let variants = self.enums.get(&enum_name).map(Vec::as_slice).unwrap_or_default();
                    let ordinal = variants
                        .iter()
                        .position(|v| v == name)
                        .ok_or_else(|| Self::unknown(target, name))?;
                    Some(ordinal)
                };
                self.cached(format!("enum:{enum_name}:{ordinal:?}"), || Object::EnumValue { ordinal })
            }
            Object::WriteModes => match name {
                "Write" | "Posting" | "UndoPosting" => return Ok(RemoteValue::Text(name.to_string())),
                _ => return Err(Self::unknown(target, name)),
            },
            Object::Selection { rows, position } => {
                let row = position
                    .and_then(|p| rows.get(p))
                    .ok_or_else(|| HostError::CallFailed {
                        target,
                        member: name.to_string(),
                        message: "selection is not positioned on a row".to_string(),
                    })?;
                return row
                    .iter()
                    .find(|(column, _)| column == name)
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| Self::unknown(target, name));
            }
            _ => return Err(Self::unknown(target, name)),
        };
        Ok(RemoteValue::Handle(handle))
    }

    fn call(&mut self, target: Handle, method: &str, args: &[RemoteValue]) -> Result<RemoteValue, HostError> {
        match self.object(target)? {
            Object::Global => self.call_global(target, method, args),
            Object::Manager(configuration) => {
                let scope = configuration.scope;
                let allowed = match method {
                    names::CREATE_ITEM => scope == ConfigurationScope::Catalogs,
                    names::CREATE_DOCUMENT => scope == ConfigurationScope::Documents,
                    names::CREATE_RECORD_MANAGER => scope == ConfigurationScope::InformationRegisters,
                    _ => false,
                };
                if !allowed {
                    return Err(Self::unknown(target, method));
                }
                let record = Record::new(configuration.clone());
                Ok(RemoteValue::Handle(self.alloc(Object::Record(record))))
            }
            Object::Record(record) => match method {
                names::WRITE => self.write(target, args),
                names::METADATA => {
                    let full_name = record.name.full_name();
                    Ok(RemoteValue::Handle(self.alloc(Object::MetadataObject(full_name))))
                }
                _ => Err(Self::unknown(target, method)),
            },
            Object::Reference(reference) => match method {
                names::UUID => {
                    let uuid = reference.uuid;
                    Ok(RemoteValue::Handle(self.alloc(Object::Uuid(uuid))))
                }
                names::IS_EMPTY => Ok(RemoteValue::Boolean(reference.object.is_none())),
                names::GET_OBJECT => reference
                    .object
                    .map(RemoteValue::Handle)
                    .ok_or_else(|| HostError::CallFailed {
                        target,
                        member: method.to_string(),
                        message: "empty reference".to_string(),
                    }),
                names::METADATA => {
                    let full_name = reference.full_name.clone();
                    Ok(RemoteValue::Handle(self.alloc(Object::MetadataObject(full_name))))
                }
                _ => Err(Self::unknown(target, method)),
            },
            Object::Section { .. } => self.call_section(target, method, args),
            Object::MetadataRoot => {
                if method != names::FIND_BY_TYPE {
                    return Err(Self::unknown(target, method));
                }
                let descriptor = args.first().and_then(RemoteValue::as_handle);
                let full_name = match descriptor.map(|h| self.object(h)).transpose()? {
                    Some(Object::TypeDescriptor(full_name)) => full_name.clone(),
                    _ => return Ok(RemoteValue::Null),
                };
                Ok(RemoteValue::Handle(self.alloc(Object::MetadataObject(full_name))))
            }
            Object::MetadataCollection(scope) => {
                if method != names::FIND {
                    return Err(Self::unknown(target, method));
                }
                let full_name = configuration_name(*scope, text_arg(method, args, 0)?).full_name();
                if !self.schemas.contains_key(&full_name) {
                    return Ok(RemoteValue::Null);
                }
                Ok(RemoteValue::Handle(self.alloc(Object::MetadataObject(full_name))))
            }
            Object::MetadataObject(full_name) => match method {
                names::FULL_NAME => Ok(RemoteValue::Text(full_name.clone())),
                _ => Err(Self::unknown(target, method)),
            },
            Object::MetadataList(items) => match method {
                names::COUNT => Ok(RemoteValue::Integer(items.len() as i64)),
                names::GET => {
                    let index = integer_arg(method, args, 0)?;
                    let item = usize::try_from(index)
                        .ok()
                        .and_then(|i| items.get(i))
                        .cloned()
                        .ok_or_else(|| HostError::CallFailed {
                            target,
                            member: method.to_string(),
                            message: format!("index {index} out of range"),
                        })?;
                    Ok(RemoteValue::Handle(self.alloc(Object::MetadataItem(item))))
                }
                _ => Err(Self::unknown(target, method)),
            },
            Object::ValueList(items) => match method {
                names::COUNT => Ok(RemoteValue::Integer(items.len() as i64)),
                names::GET => {
                    let index = integer_arg(method, args, 0)?;
                    usize::try_from(index)
                        .ok()
                        .and_then(|i| items.get(i))
                        .map(|h| RemoteValue::Handle(*h))
                        .ok_or_else(|| HostError::CallFailed {
                            target,
                            member: method.to_string(),
                            message: format!("index {index} out of range"),
                        })
                }
                _ => Err(Self::unknown(target, method)),
            },
            Object::EnumManager(_) => {
                if method != names::INDEX_OF {
                    return Err(Self::unknown(target, method));
                }
                let value = args.first().and_then(RemoteValue::as_handle);
                match value.map(|h| self.object(h)).transpose()? {
                    Some(Object::EnumValue { ordinal }) => {
                        Ok(RemoteValue::Integer(ordinal.map_or(-1, |o| o as i64)))
                    }
                    _ => Ok(RemoteValue::Integer(-1)),
                }
            }
            Object::EnumValue { ordinal } => match method {
                names::IS_EMPTY => Ok(RemoteValue::Boolean(ordinal.is_none())),
                _ => Err(Self::unknown(target, method)),
            },
            Object::Query { text } => match method {
                names::SET_PARAMETER => {
                    let name = text_arg(method, args, 0)?.to_string();
                    let value = args.get(1).cloned().unwrap_or(RemoteValue::Null);
                    self.parameters.push((name, value));
                    Ok(RemoteValue::Null)
                }
                names::EXECUTE => {
                    let rows = self.queries.get(text).cloned().ok_or_else(|| HostError::CallFailed {
                        target,
                        member: method.to_string(),
                        message: format!("no result registered for query [{text}]"),
                    })?;
                    Ok(RemoteValue::Handle(self.alloc(Object::QueryResult(rows))))
                }
                _ => Err(Self::unknown(target, method)),
            },
            Object::QueryResult(rows) => {
                if method != names::SELECT {
                    return Err(Self::unknown(target, method));
                }
                let rows = rows.clone();
                Ok(RemoteValue::Handle(self.alloc(Object::Selection {
                    rows,
                    position: None,
                })))
            }
            Object::Selection { .. } => {
                if method != names::NEXT {
                    return Err(Self::unknown(target, method));
                }
                let Object::Selection { rows, position } = self.object_mut(target)? else {
                    return Err(HostError::InvalidHandle(target));
                };
                let next = position.map_or(0, |p| p + 1);
                *position = Some(next.min(rows.len()));
                Ok(RemoteValue::Boolean(next < rows.len()))
            }
            other => Err(HostError::CallFailed {
                target,
                member: method.to_string(),
                message: format!("{} has no methods", other.kind()),
            }),
        }
    }

    fn call_global(&mut self, target: Handle, method: &str, args: &[RemoteValue]) -> Result<RemoteValue, HostError> {
        match method {
            names::NEW_OBJECT => match text_arg(method, args, 0)? {
                names::UUID => {
                    let text = text_arg(method, args, 1)?;
                    let uuid = Uuid::parse_str(text).map_err(|e| HostError::CallFailed {
                        target,
                        member: method.to_string(),
                        message: e.to_string(),
                    })?;
                    Ok(RemoteValue::Handle(self.alloc(Object::Uuid(uuid))))
                }
                names::QUERY => {
                    self.parameters.clear();
                    Ok(RemoteValue::Handle(self.alloc(Object::Query {
                        text: String::new(),
                    })))
                }
                other => Err(HostError::CallFailed {
                    target,
                    member: method.to_string(),
                    message: format!("unknown object type [{other}]"),
                }),
            },
            names::STRING => {
                let value = args.first().cloned().unwrap_or(RemoteValue::Null);
                let text = match value {
                    RemoteValue::Handle(handle) => match self.object(handle)? {
                        Object::Uuid(uuid) => uuid.to_string(),
                        Object::Reference(reference) => reference.uuid.to_string(),
                        other => other.kind().to_string(),
                    },
                    RemoteValue::Null => String::new(),
                    other => other.to_string(),
                };
                Ok(RemoteValue::Text(text))
            }
            names::TYPE => {
                let name = text_arg(method, args, 0)?;
                let (prefix, object) = name.split_once('.').ok_or_else(|| HostError::CallFailed {
                    target,
                    member: method.to_string(),
                    message: format!("invalid type name [{name}]"),
                })?;
                let kind = prefix.strip_suffix("Ref").unwrap_or(prefix);
                let full_name = format!("{kind}.{object}");
                Ok(RemoteValue::Handle(self.alloc(Object::TypeDescriptor(full_name))))
            }
            _ => Err(Self::unknown(target, method)),
        }
    }

    fn call_section(&mut self, target: Handle, method: &str, args: &[RemoteValue]) -> Result<RemoteValue, HostError> {
        let Object::Section { row_name, rows } = self.object(target)? else {
            return Err(HostError::InvalidHandle(target));
        };
        let mut rows = rows.clone();
        let row_name = row_name.clone();
        let out_of_range = |index: i64| HostError::CallFailed {
            target,
            member: method.to_string(),
            message: format!("index {index} out of range"),
        };
        let position = |index: i64, len: usize| {
            usize::try_from(index)
                .ok()
                .filter(|i| *i < len)
                .ok_or_else(|| out_of_range(index))
        };

        let result = match method {
            names::COUNT => return Ok(RemoteValue::Integer(rows.len() as i64)),
            names::GET => {
                let index = position(integer_arg(method, args, 0)?, rows.len())?;
                return Ok(RemoteValue::Handle(rows[index]));
            }
            names::CLEAR => {
                rows.clear();
                RemoteValue::Null
            }
            names::ADD | names::INSERT => {
                let index = if method == names::INSERT {
                    position(integer_arg(method, args, 0)?, rows.len() + 1)?
                } else {
                    rows.len()
                };
                let name = ConfigurationName::parse(&row_name)?;
                let row = self.alloc(Object::Record(Record::new(name)));
                rows.insert(index, row);
                RemoteValue::Handle(row)
            }
            names::DELETE => {
                let index = position(integer_arg(method, args, 0)?, rows.len())?;
                rows.remove(index);
                RemoteValue::Null
            }
            names::MOVE => {
                let from = position(integer_arg(method, args, 0)?, rows.len())?;
                let delta = integer_arg(method, args, 1)?;
                let to = position(from as i64 + delta, rows.len())?;
                let row = rows.remove(from);
                rows.insert(to, row);
                RemoteValue::Null
            }
            _ => return Err(Self::unknown(target, method)),
        };

        for (i, row) in rows.iter().enumerate() {
            self.record_mut(*row)?
                .properties
                .insert(names::LINE_NUMBER.to_string(), RemoteValue::Integer(i as i64 + 1));
        }
        if let Object::Section { rows: stored, .. } = self.object_mut(target)? {
            *stored = rows;
        }
        Ok(result)
    }

    fn write(&mut self, target: Handle, args: &[RemoteValue]) -> Result<RemoteValue, HostError> {
        let argument = args.first().cloned().unwrap_or(RemoteValue::Null);
        let number = self.next_number;
        let record = self.record_mut(target)?;
        let name = record.name.clone();
        let mut assigned_number = false;

        match name.scope {
            ConfigurationScope::Documents => {
                match argument.as_text() {
                    Some("Posting") => {
                        record.properties.insert(names::POSTED.to_string(), RemoteValue::Boolean(true));
                    }
                    Some("UndoPosting") => {
                        record.properties.insert(names::POSTED.to_string(), RemoteValue::Boolean(false));
                    }
                    _ => {}
                }
                assigned_number = assign_if_missing(record, names::NUMBER, number);
            }
            ConfigurationScope::Catalogs => {
                assigned_number = assign_if_missing(record, names::CODE, number);
            }
            _ => {}
        }
        let needs_reference = name.has_reference() && record.reference.is_none();
        if assigned_number {
            self.next_number += 1;
        }

        let full_name = name.full_name();
        if needs_reference {
            let reference = self.alloc(Object::Reference(Reference {
                full_name: full_name.clone(),
                uuid: Uuid::new_v4(),
                object: Some(target),
            }));
            self.record_mut(target)?.reference = Some(reference);
        }
        if name.scope == ConfigurationScope::InformationRegisters {
            let records = self.register_records.entry(full_name.clone()).or_default();
            if !records.contains(&target) {
                records.push(target);
            }
        }
        self.writes.push(WriteRecord {
            object: full_name,
            handle: target,
            argument,
        });
        Ok(RemoteValue::Null)
    }
}

fn assign_if_missing(record: &mut Record, field: &str, number: u64) -> bool {
    let missing = match record.properties.get(field) {
        None | Some(RemoteValue::Null) => true,
        Some(RemoteValue::Text(s)) => s.is_empty(),
        Some(_) => false,
    };
    if missing {
        record
            .properties
            .insert(field.to_string(), RemoteValue::Text(format!("{number:09}")));
    }
    missing
}

impl RemoteHost for MemoryHost {
    fn global(&self) -> Handle {
        Handle::from_raw(1)
    }

    fn invoke(&mut self, target: Handle, method: &str, args: &[RemoteValue]) -> Result<RemoteValue, HostError> {
        self.calls.push(Call::Invoke(method.to_string()));
        self.check_failure(target, method)?;
        self.call(target, method, args)
    }

    fn get_property(&mut self, target: Handle, name: &str) -> Result<RemoteValue, HostError> {
        self.calls.push(Call::Get(name.to_string()));
        self.read(target, name)
    }

    fn set_property(&mut self, target: Handle, name: &str, value: RemoteValue) -> Result<(), HostError> {
        self.calls.push(Call::Set(name.to_string()));
        self.check_failure(target, name)?;
        match self.object_mut(target)? {
            Object::Record(record) => {
                if record.sections.contains_key(name) || name == names::REF {
                    return Err(Self::unknown(target, name));
                }
                record.properties.insert(name.to_string(), value);
                Ok(())
            }
            Object::Query { text } if name == names::TEXT => {
                *text = value.as_text().unwrap_or_default().to_string();
                Ok(())
            }
            _ => Err(Self::unknown(target, name)),
        }
    }

    fn release(&mut self, handle: Handle) {
        self.released.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onebridge_host::RemoteHostExt;

    fn host() -> MemoryHost {
        MemoryHost::new()
            .with_object(
                "Document.Order",
                ObjectSchema::attributes(&["Counterparty"]).with_table_section("Lines"),
            )
            .with_enum("OrderStatuses", &["Draft", "Confirmed"])
    }

    #[test]
    fn section_edits_renumber_rows() -> Result<(), Box<dyn std::error::Error>> {
        let mut host = host();
        let order = host.insert_record("Document.Order", vec![])?;
        let object = host.invoke_handle(order, names::GET_OBJECT, &[])?;
        let lines = host.property_handle(object, "Lines")?;

        let first = host.invoke_handle(lines, names::ADD, &[])?;
        let second = host.invoke_handle(lines, names::INSERT, &[RemoteValue::Integer(0)])?;
        assert_eq!(host.section_rows(order, "Lines"), vec![second, first]);
        assert_eq!(host.property(first, names::LINE_NUMBER), Some(RemoteValue::Integer(2)));

        host.invoke(lines, names::MOVE, &[RemoteValue::Integer(1), RemoteValue::Integer(-1)])?;
        assert_eq!(host.section_rows(order, "Lines"), vec![first, second]);
        assert_eq!(host.property(first, names::LINE_NUMBER), Some(RemoteValue::Integer(1)));
        Ok(())
    }

    #[test]
    fn enum_values_round_trip_through_index_of() -> Result<(), Box<dyn std::error::Error>> {
        let mut host = host();
        let confirmed = host.enum_value("OrderStatuses", "Confirmed")?;
        let global = host.global();
        let enums = host.property_handle(global, names::ENUMS)?;
        let manager = host.property_handle(enums, "OrderStatuses")?;
        let index = host.invoke(manager, names::INDEX_OF, &[RemoteValue::Handle(confirmed)])?;
        assert_eq!(index, RemoteValue::Integer(1));
        Ok(())
    }

    #[test]
    fn injected_failures_surface_as_call_errors() {
        let mut host = host();
        host.fail_on(names::WRITE, "locked");
        let global = host.global();
        let err = host.invoke(global, names::WRITE, &[]).unwrap_err();
        assert!(matches!(err, HostError::CallFailed { .. }));
    }
}
