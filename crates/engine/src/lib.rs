pub mod config;
pub mod error;
pub mod marshal;
pub mod query;
mod save;
mod session;

pub use config::ContextConfig;
pub use error::EngineError;
pub use marshal::is_null_date;
pub use query::{BuiltQuery, QueryResults, Queryable, RowReader};
pub use session::Session;

use std::cell::RefCell;
use std::rc::Rc;

use onebridge_core::{
    Entity, EntityKind, EntityRef, EntityType, FieldType, RemoteValue, TypeRegistry, Value,
};
use onebridge_host::{EnumMapper, MetadataAccessor, RemoteHost};
use tracing::debug;

use crate::save::prepare_to_save;
use crate::session::State;

/// Unit of work over one remote session: saves entity graphs and runs
/// queries against the platform behind `H`.
pub struct DataContext<H: RemoteHost> {
    registry: TypeRegistry,
    config: ContextConfig,
    state: RefCell<State<H>>,
}

impl<H: RemoteHost> DataContext<H> {
    pub fn new(host: H, registry: TypeRegistry, config: ContextConfig) -> Self {
        let metadata = MetadataAccessor::new(config.cache_metadata);
        Self {
            registry,
            config,
            state: RefCell::new(State {
                host,
                enums: EnumMapper::new(),
                metadata,
            }),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Entity type registered under a full configuration name such as
    /// `Catalog.Counterparties`.
    pub fn get_type_or_null(&self, configuration_name: &str) -> Option<&'static EntityType> {
        self.registry.get_type_or_null(configuration_name)
    }

    /// Queries over `T`, reading from `source_name` or, when absent, from the
    /// configuration object `T` is mapped to.
    pub fn select<T: EntityKind>(&self, source_name: Option<&str>) -> Result<Queryable<T>, EngineError> {
        let source_name = match source_name {
            Some(name) => name.to_string(),
            None => T::descriptor()
                .configuration
                .as_ref()
                .map(|c| c.full_name())
                .ok_or(EngineError::UnknownConfigurationType(T::NAME))?,
        };
        Ok(Queryable::new(source_name))
    }

    /// Persist a typed entity and every dirty entity reachable from it.
    pub fn save<T: Entity>(&self, entity: &Rc<RefCell<T>>) -> Result<(), EngineError> {
        let entity: EntityRef = entity.clone();
        self.save_ref(&entity)
    }

    pub fn save_ref(&self, entity: &EntityRef) -> Result<(), EngineError> {
        let pending = prepare_to_save(entity)?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!(count = pending.len(), "saving entity graph");

        let mut state = self.state.borrow_mut();
        let mut session = Session::new(&mut *state, &self.registry);
        let mut chain = Vec::new();
        for entity in &pending {
            session.save_one(entity, None, &mut chain)?;
        }
        Ok(())
    }

    /// Convert a raw remote value the way entity fields are read.
    pub fn map_from_remote(
        &self,
        value: RemoteValue,
        field_type: FieldType,
    ) -> Result<Value, EngineError> {
        let mut state = self.state.borrow_mut();
        Session::new(&mut *state, &self.registry).map_from_remote(value, field_type)
    }

    pub fn map_to_remote(&self, value: &Value) -> Result<RemoteValue, EngineError> {
        let mut state = self.state.borrow_mut();
        Session::new(&mut *state, &self.registry).map_to_remote(value)
    }

    /// Direct access to the host binding, e.g. for inspection in tests.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.state.borrow_mut().host)
    }

    pub fn into_host(self) -> H {
        self.state.into_inner().host
    }
}
