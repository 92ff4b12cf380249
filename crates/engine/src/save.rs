//! Graph persistence: writes dirty entities and their nested rows back to
//! the remote platform.
//!
//! Partial writes are possible: if a nested save or a commit fails, objects
//! written earlier in the same call stay written. The remote platform's own
//! transaction handling is outside this module.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use onebridge_core::{
    ConfigurationName, ConfigurationScope, EntityRef, FieldType, Handle, RemoteValue, SyncCommand,
    SyncList, Value, ValueSource,
};
use onebridge_host::{DocumentWriteMode, HostError, RemoteHostExt, global, names};
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::session::Session;

/// One element of the path of objects currently being saved.
pub(crate) enum PathLabel {
    Entity(EntityRef, &'static str),
    Field(String),
    Index(usize),
}

impl PathLabel {
    fn is_entity(&self, entity: &EntityRef) -> bool {
        matches!(self, PathLabel::Entity(e, _) if Rc::ptr_eq(e, entity))
    }
}

impl fmt::Display for PathLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathLabel::Entity(_, name) => f.write_str(name),
            PathLabel::Field(name) => f.write_str(name),
            PathLabel::Index(i) => write!(f, "{i}"),
        }
    }
}

fn render(chain: &[PathLabel]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("->")
}

fn remote(chain: &[PathLabel]) -> impl FnOnce(HostError) -> EngineError + '_ {
    move |source| EngineError::Remote {
        path: render(chain),
        source,
    }
}

/// Collect the entities reachable from `root` that need an independent save,
/// referenced entities first.
///
/// A parent whose table-section rows were edited in place (without the
/// section itself being reassigned) gets that section re-recorded so the
/// rows are rewritten with it. Synchronized sections get an `Update` logged
/// for each such row instead.
pub(crate) fn prepare_to_save(root: &EntityRef) -> Result<Vec<EntityRef>, EngineError> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    collect(root, true, &mut visited, &mut out)?;
    Ok(out)
}

fn collect(
    entity: &EntityRef,
    standalone: bool,
    visited: &mut HashSet<*const ()>,
    out: &mut Vec<EntityRef>,
) -> Result<(), EngineError> {
    if !visited.insert(Rc::as_ptr(entity) as *const ()) {
        return Ok(());
    }

    let mut references = Vec::new();
    let mut rows = Vec::new();
    let mut stale_sections = Vec::new();
    let mut stale_sync_lists = Vec::new();
    {
        let e = entity.borrow();
        for field in &e.entity_type().fields {
            match (field.get)(&*e) {
                Value::Entity(child) => references.push(child),
                Value::List(items) => {
                    let rows_dirty = items.iter().any(|r| r.borrow().controller().is_dirty());
                    if rows_dirty && !e.controller().is_changed(field.name) {
                        stale_sections.push((field.name, Value::List(items.clone())));
                    }
                    rows.extend(items);
                }
                Value::SyncList(mut list) => {
                    rows.extend(list.items().iter().cloned());
                    if list.record_dirty_rows() {
                        stale_sync_lists.push((field.name, Value::SyncList(list)));
                    }
                }
                _ => {}
            }
        }
    }
    for (name, items) in stale_sections {
        entity.borrow_mut().controller_mut().record(name, items);
    }
    for (name, list) in stale_sync_lists {
        entity.borrow_mut().set_field(name, list)?;
    }
    for child in &references {
        collect(child, true, visited, out)?;
    }
    for row in &rows {
        collect(row, false, visited, out)?;
    }
    if standalone && entity.borrow().controller().is_dirty() {
        out.push(entity.clone());
    }
    Ok(())
}

impl Session<'_> {
    /// Save one entity, either as a top-level object (`target` is `None`) or
    /// into an existing row of its parent's table section.
    pub(crate) fn save_one(
        &mut self,
        entity: &EntityRef,
        target: Option<Handle>,
        chain: &mut Vec<PathLabel>,
    ) -> Result<(), EngineError> {
        let (name, dirty) = {
            let e = entity.borrow();
            (e.entity_type().name, e.controller().is_dirty())
        };
        if !dirty {
            return Ok(());
        }
        if chain.iter().any(|label| label.is_entity(entity)) {
            let mut rendered = render(chain);
            rendered.push_str("->");
            rendered.push_str(name);
            return Err(EngineError::CycleDetected {
                entity: name,
                chain: rendered,
            });
        }

        let mark = chain.len();
        chain.push(PathLabel::Entity(entity.clone(), name));
        let result = self.save_entity(entity, target, chain);
        chain.truncate(mark);
        result
    }

    fn save_entity(
        &mut self,
        entity: &EntityRef,
        target: Option<Handle>,
        chain: &mut Vec<PathLabel>,
    ) -> Result<(), EngineError> {
        let (entity_type, is_new, source, changes) = {
            let e = entity.borrow();
            let controller = e.controller();
            (
                e.entity_type(),
                controller.is_new(),
                controller.value_source().copied(),
                controller.changed().map(<[_]>::to_vec),
            )
        };

        let (configuration, target) = match target {
            Some(handle) => (None, handle),
            None => {
                let configuration = entity_type
                    .configuration
                    .clone()
                    .ok_or(EngineError::UnknownConfigurationType(entity_type.name))?;
                let handle = self.resolve_target(&configuration, is_new, source, entity_type.name, chain)?;
                (Some(configuration), handle)
            }
        };
        let scope = configuration.as_ref().map(|c| c.scope);
        debug!(
            entity = entity_type.name,
            path = %render(chain),
            handle = %target,
            is_new,
            "saving entity"
        );

        let mut posting = None;
        if let Some(changes) = &changes {
            for (field, value) in changes {
                if field == names::POSTED && scope == Some(ConfigurationScope::Documents) {
                    posting = value.as_boolean();
                    continue;
                }
                chain.push(PathLabel::Field(field.clone()));
                let result = self.save_property(field, value.clone(), target, chain);
                chain.pop();
                result?;
            }
        }

        if let (Some(configuration), Some(source), Some(changes)) = (&configuration, source, &changes)
            && configuration.scope == ConfigurationScope::InformationRegisters
            && !source.is_writable()
        {
            self.backfill(configuration, source.backing_handle(), changes, target, chain)?;
        }

        let bound_handle = match &configuration {
            Some(configuration) => {
                self.commit(configuration, target, posting, chain)?;
                match configuration.scope {
                    ConfigurationScope::Catalogs => {
                        self.update_if_exists(entity, target, names::CODE, chain)?
                    }
                    ConfigurationScope::Documents => {
                        self.update_if_exists(entity, target, names::NUMBER, chain)?
                    }
                    _ => {}
                }
                if configuration.has_reference() {
                    let reference = self
                        .host
                        .property_handle(target, names::REF)
                        .map_err(remote(chain))?;
                    self.update_id(entity, reference, configuration, chain)?;
                    reference
                } else {
                    target
                }
            }
            None => {
                self.update_if_exists(entity, target, names::LINE_NUMBER, chain)?;
                target
            }
        };

        let writable = scope == Some(ConfigurationScope::InformationRegisters);
        entity
            .borrow_mut()
            .controller_mut()
            .reset_dirty(ValueSource::new(bound_handle, writable));
        settle_sync_lists(entity)
    }

    fn resolve_target(
        &mut self,
        configuration: &ConfigurationName,
        is_new: bool,
        source: Option<ValueSource>,
        entity_name: &'static str,
        chain: &[PathLabel],
    ) -> Result<Handle, EngineError> {
        if configuration.scope == ConfigurationScope::InformationRegisters {
            return match source {
                Some(source) if source.is_writable() => Ok(source.backing_handle()),
                _ => {
                    let manager = global::manager(self.host, configuration).map_err(remote(chain))?;
                    self.host
                        .create_handle(manager, names::CREATE_RECORD_MANAGER)
                        .map_err(remote(chain))
                }
            };
        }

        if is_new {
            let kind = match configuration.scope {
                ConfigurationScope::Catalogs => names::CREATE_ITEM,
                ConfigurationScope::Documents => names::CREATE_DOCUMENT,
                _ => return Err(EngineError::UnsupportedEntityKind(configuration.full_name())),
            };
            let manager = global::manager(self.host, configuration).map_err(remote(chain))?;
            return self.host.create_handle(manager, kind).map_err(remote(chain));
        }

        let source = source.ok_or(EngineError::UnsavedReference(entity_name))?;
        self.host
            .invoke_handle(source.backing_handle(), names::GET_OBJECT, &[])
            .map_err(remote(chain))
    }

    /// Apply one field value to the target object.
    fn save_property(
        &mut self,
        name: &str,
        value: Value,
        target: Handle,
        chain: &mut Vec<PathLabel>,
    ) -> Result<(), EngineError> {
        match value {
            Value::List(items) => {
                let section = self.host.property_handle(target, name).map_err(remote(chain))?;
                self.host.invoke(section, names::CLEAR, &[]).map_err(remote(chain))?;
                for (index, item) in items.iter().enumerate() {
                    let row = self
                        .host
                        .invoke_handle(section, names::ADD, &[])
                        .map_err(remote(chain))?;
                    chain.push(PathLabel::Index(index));
                    let result = self.save_one(item, Some(row), chain);
                    chain.pop();
                    result?;
                }
                Ok(())
            }
            Value::SyncList(list) => {
                let section = self.host.property_handle(target, name).map_err(remote(chain))?;
                self.replay(section, &list, chain)
            }
            Value::Entity(entity) => {
                self.save_one(&entity, None, chain)?;
                let handle = {
                    let e = entity.borrow();
                    e.controller()
                        .value_source()
                        .map(ValueSource::backing_handle)
                        .ok_or(EngineError::UnsavedReference(e.entity_type().name))?
                };
                self.host
                    .set_property(target, name, RemoteValue::Handle(handle))
                    .map_err(remote(chain))
            }
            Value::Enum(enum_value) => {
                let remote_value = self
                    .enums
                    .to_remote(self.host, enum_value)
                    .map_err(remote(chain))?;
                self.host
                    .set_property(target, name, remote_value)
                    .map_err(remote(chain))
            }
            other => {
                let remote_value = self.map_to_remote(&other)?;
                self.host
                    .set_property(target, name, remote_value)
                    .map_err(remote(chain))
            }
        }
    }

    /// Replay recorded table-section edits in order.
    fn replay(
        &mut self,
        section: Handle,
        list: &SyncList,
        chain: &mut Vec<PathLabel>,
    ) -> Result<(), EngineError> {
        for command in list.commands() {
            trace!(?command, "replaying table section command");
            match command {
                SyncCommand::Delete { index } => {
                    self.host
                        .invoke(section, names::DELETE, &[RemoteValue::Integer(*index as i64)])
                        .map_err(remote(chain))?;
                }
                SyncCommand::Insert { index, item } => {
                    let row = self
                        .host
                        .invoke_handle(section, names::INSERT, &[RemoteValue::Integer(*index as i64)])
                        .map_err(remote(chain))?;
                    chain.push(PathLabel::Index(*index));
                    let result = self.save_one(item, Some(row), chain);
                    chain.pop();
                    result?;
                }
                SyncCommand::Move { from, delta } => {
                    self.host
                        .invoke(
                            section,
                            names::MOVE,
                            &[
                                RemoteValue::Integer(*from as i64),
                                RemoteValue::Integer(*delta as i64),
                            ],
                        )
                        .map_err(remote(chain))?;
                }
                SyncCommand::Update { index, item } => {
                    let row = self
                        .host
                        .invoke_handle(section, names::GET, &[RemoteValue::Integer(*index as i64)])
                        .map_err(remote(chain))?;
                    chain.push(PathLabel::Index(*index));
                    let result = self.save_one(item, Some(row), chain);
                    chain.pop();
                    result?;
                }
            }
        }
        Ok(())
    }

    /// Re-apply every requisite not in the change log from the original
    /// record, so the record manager writes a full row.
    fn backfill(
        &mut self,
        configuration: &ConfigurationName,
        original: Handle,
        changes: &[(String, Value)],
        target: Handle,
        chain: &mut Vec<PathLabel>,
    ) -> Result<(), EngineError> {
        let requisites = self
            .metadata
            .requisite_names(self.host, configuration)
            .map_err(remote(chain))?;
        for requisite in requisites.iter() {
            if changes.iter().any(|(name, _)| name == requisite) {
                continue;
            }
            chain.push(PathLabel::Field(requisite.clone()));
            let result = match self.host.get_property(original, requisite) {
                Ok(value) => self.save_property(requisite, Value::Remote(value), target, chain),
                Err(e) => Err(remote(chain)(e)),
            };
            chain.pop();
            result?;
        }
        Ok(())
    }

    fn commit(
        &mut self,
        configuration: &ConfigurationName,
        target: Handle,
        mut posting: Option<bool>,
        chain: &[PathLabel],
    ) -> Result<(), EngineError> {
        if posting.is_none() && configuration.scope == ConfigurationScope::Documents {
            let posted = self
                .host
                .get_property(target, names::POSTED)
                .map_err(remote(chain))?
                .as_boolean()
                .unwrap_or(false);
            if posted {
                // Arbitrary writes are only accepted on an unposted document.
                self.write(target, configuration, Some(false), chain)?;
                posting = Some(true);
            }
        }
        self.write(target, configuration, posting, chain)
    }

    fn write(
        &mut self,
        target: Handle,
        configuration: &ConfigurationName,
        posting: Option<bool>,
        chain: &[PathLabel],
    ) -> Result<(), EngineError> {
        let (argument, description) =
            if configuration.scope == ConfigurationScope::InformationRegisters {
                (RemoteValue::Boolean(true), "true")
            } else {
                let mode = DocumentWriteMode::from_posting(posting);
                let argument = global::write_mode(self.host, mode).map_err(remote(chain))?;
                (argument, mode.as_str())
            };
        debug!(object = %configuration, argument = description, "writing");
        self.host
            .invoke(target, names::WRITE, &[argument])
            .map_err(|cause| EngineError::WriteFailed {
                configuration_name: configuration.full_name(),
                argument: description.to_string(),
                cause,
            })?;
        Ok(())
    }

    fn update_id(
        &mut self,
        entity: &EntityRef,
        reference: Handle,
        configuration: &ConfigurationName,
        chain: &[PathLabel],
    ) -> Result<(), EngineError> {
        if !entity.borrow().entity_type().has_field(names::ID) {
            return Err(EngineError::MissingIdentityProperty(configuration.full_name()));
        }
        let raw = self
            .host
            .invoke(reference, names::UUID, &[])
            .map_err(remote(chain))?;
        let id = self.map_from_remote(raw, FieldType::Guid)?;
        set_without_tracking(entity, names::ID, id)
    }

    /// Copy a platform-assigned field back when the entity type declares it.
    fn update_if_exists(
        &mut self,
        entity: &EntityRef,
        source: Handle,
        name: &str,
        chain: &[PathLabel],
    ) -> Result<(), EngineError> {
        let field_type = entity
            .borrow()
            .entity_type()
            .field(name)
            .map(|f| f.field_type);
        let Some(field_type) = field_type else {
            return Ok(());
        };
        let raw = self.host.get_property(source, name).map_err(remote(chain))?;
        let value = self.map_from_remote(raw, field_type)?;
        set_without_tracking(entity, name, value)
    }
}

fn set_without_tracking(entity: &EntityRef, name: &str, value: Value) -> Result<(), EngineError> {
    let mut e = entity.borrow_mut();
    let previous = e.controller_mut().set_track_changes(false);
    let result = e.set_field(name, value);
    e.controller_mut().set_track_changes(previous);
    Ok(result?)
}

/// Drop replayed commands so the next save starts from the written rows.
fn settle_sync_lists(entity: &EntityRef) -> Result<(), EngineError> {
    let pending: Vec<_> = {
        let e = entity.borrow();
        e.entity_type()
            .fields
            .iter()
            .filter_map(|field| match (field.get)(&*e) {
                Value::SyncList(list) if !list.commands().is_empty() => Some((field.name, list)),
                _ => None,
            })
            .collect()
    };
    for (name, mut list) in pending {
        list.clear_commands();
        set_without_tracking(entity, name, Value::SyncList(list))?;
    }
    Ok(())
}
