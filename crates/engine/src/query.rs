//! Query execution: runs compiled query text on the platform and streams the
//! rows back as entities or projected values.

use std::fmt;
use std::marker::PhantomData;

use onebridge_core::{EntityKind, EntityRef, EntityType, FieldType, Handle, RemoteValue, Value};
use onebridge_host::{HostError, RemoteHost, RemoteHostExt, global, names};
use tracing::{debug, trace, warn};

use crate::DataContext;
use crate::error::EngineError;
use crate::session::Session;

type Projection<R> = Box<dyn FnMut(&mut RowReader<'_>) -> Result<R, EngineError>>;

enum RowMapper<R> {
    Entity(fn(Value) -> Result<R, EngineError>),
    Projection(Projection<R>),
}

fn expect_entity(value: Value) -> Result<EntityRef, EngineError> {
    match value {
        Value::Entity(entity) => Ok(entity),
        other => Err(EngineError::InvalidRemoteValue {
            expected: "entity row".to_string(),
            message: format!("got {}", other.kind()),
        }),
    }
}

/// Output of the query compiler: text, ordered parameters and the entity
/// type the rows belong to.
pub struct BuiltQuery<R = EntityRef> {
    query_text: String,
    parameters: Vec<(String, Value)>,
    entity_type: &'static EntityType,
    mapper: RowMapper<R>,
}

impl BuiltQuery {
    pub fn new(query_text: impl Into<String>, entity_type: &'static EntityType) -> Self {
        Self {
            query_text: query_text.into(),
            parameters: Vec::new(),
            entity_type,
            mapper: RowMapper::Entity(expect_entity),
        }
    }

    /// Replace entity materialization with a projection over each row.
    pub fn with_projection<R>(
        self,
        projection: impl FnMut(&mut RowReader<'_>) -> Result<R, EngineError> + 'static,
    ) -> BuiltQuery<R> {
        BuiltQuery {
            query_text: self.query_text,
            parameters: self.parameters,
            entity_type: self.entity_type,
            mapper: RowMapper::Projection(Box::new(projection)),
        }
    }
}

impl<R> BuiltQuery<R> {
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    pub fn entity_type(&self) -> &'static EntityType {
        self.entity_type
    }

    pub fn has_projection(&self) -> bool {
        matches!(self.mapper, RowMapper::Projection(_))
    }
}

impl<R> fmt::Debug for BuiltQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltQuery")
            .field("query_text", &self.query_text)
            .field("parameters", &self.parameters)
            .field("entity_type", &self.entity_type.name)
            .field("projection", &self.has_projection())
            .finish()
    }
}

/// Entry point for queries over one entity type.
pub struct Queryable<T, R = EntityRef> {
    source_name: String,
    mapper: RowMapper<R>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: EntityKind> Queryable<T> {
    pub(crate) fn new(source_name: String) -> Self {
        Self {
            source_name,
            mapper: RowMapper::Entity(expect_entity),
            _kind: PhantomData,
        }
    }

    pub fn with_projection<R>(
        self,
        projection: impl FnMut(&mut RowReader<'_>) -> Result<R, EngineError> + 'static,
    ) -> Queryable<T, R> {
        Queryable {
            source_name: self.source_name,
            mapper: RowMapper::Projection(Box::new(projection)),
            _kind: PhantomData,
        }
    }
}

impl<T: EntityKind, R> Queryable<T, R> {
    /// Remote source the query reads from, e.g. `Catalog.Counterparties`.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Build a query from compiled text.
    pub fn query(self, query_text: impl Into<String>) -> BuiltQuery<R> {
        BuiltQuery {
            query_text: query_text.into(),
            parameters: Vec::new(),
            entity_type: T::descriptor(),
            mapper: self.mapper,
        }
    }

    /// Every row of the source.
    pub fn all(self) -> BuiltQuery<R> {
        let text = format!("SELECT * FROM {}", self.source_name);
        self.query(text)
    }
}

/// Read access to the current row of a selection.
pub struct RowReader<'a> {
    session: Session<'a>,
    row: Handle,
}

impl RowReader<'_> {
    pub fn handle(&self) -> Handle {
        self.row
    }

    /// Raw column value.
    pub fn get(&mut self, column: &str) -> Result<RemoteValue, EngineError> {
        Ok(self.session.host.get_property(self.row, column)?)
    }

    /// Column value converted to `field_type`.
    pub fn get_as(&mut self, column: &str, field_type: FieldType) -> Result<Value, EngineError> {
        let raw = self.get(column)?;
        self.session.map_from_remote(raw, field_type)
    }
}

/// Live cursor over a query result.
///
/// Rows are fetched one `Next()` at a time. The selection and result objects
/// are released when the cursor is exhausted or dropped.
///
/// Entities of types without a reference (register rows) are bound to the
/// selection itself, so they are only readable while the cursor sits on
/// their row. Saving such an entity after the cursor has moved on or been
/// released reads the wrong row or fails; project the needed columns
/// instead, or save each row before advancing.
pub struct QueryResults<'c, H: RemoteHost, R = EntityRef> {
    context: &'c DataContext<H>,
    entity_type: &'static EntityType,
    has_reference: bool,
    mapper: RowMapper<R>,
    cursor: Option<(Handle, Handle)>,
}

impl<H: RemoteHost> DataContext<H> {
    /// Run a built query and return a forward-only cursor over its rows.
    pub fn execute<R>(&self, query: BuiltQuery<R>) -> Result<QueryResults<'_, H, R>, EngineError> {
        let mut state = self.state.borrow_mut();
        let mut session = Session::new(&mut *state, &self.registry);

        let mut parameters = Vec::with_capacity(query.parameters.len());
        for (name, value) in &query.parameters {
            parameters.push((name.as_str(), session.map_to_remote(value)?));
        }
        let has_reference = query.entity_type.has_reference();

        let host = session.host();
        let remote_query = global::new_object(host, names::QUERY, &[])?;
        let opened = open_cursor(host, remote_query, &query.query_text, parameters);
        host.release(remote_query);
        let (result, selection) = opened?;
        debug!(
            entity = query.entity_type.name,
            parameters = query.parameters.len(),
            projection = query.has_projection(),
            "query executed"
        );

        Ok(QueryResults {
            context: self,
            entity_type: query.entity_type,
            has_reference,
            mapper: query.mapper,
            cursor: Some((result, selection)),
        })
    }
}

/// Load text and parameters into a `Query` object, execute it and open the
/// selection. The query object itself stays with the caller.
fn open_cursor(
    host: &mut dyn RemoteHost,
    remote_query: Handle,
    text: &str,
    parameters: Vec<(&str, RemoteValue)>,
) -> Result<(Handle, Handle), HostError> {
    host.set_property(remote_query, names::TEXT, RemoteValue::Text(text.to_string()))?;
    for (name, value) in parameters {
        host.invoke(
            remote_query,
            names::SET_PARAMETER,
            &[RemoteValue::Text(name.to_string()), value],
        )?;
    }
    let result = host.invoke_handle(remote_query, names::EXECUTE, &[])?;
    match host.invoke_handle(result, names::SELECT, &[]) {
        Ok(selection) => Ok((result, selection)),
        Err(e) => {
            host.release(result);
            Err(e)
        }
    }
}

impl<H: RemoteHost, R> QueryResults<'_, H, R> {
    fn fetch(&mut self, selection: Handle) -> Result<Option<R>, EngineError> {
        let context = self.context;
        let mut state = context.state.borrow_mut();
        let mut session = Session::new(&mut *state, &context.registry);
        if !session.host.invoke_bool(selection, names::NEXT, &[])? {
            return Ok(None);
        }
        trace!(entity = self.entity_type.name, "row fetched");

        match &mut self.mapper {
            RowMapper::Projection(projection) => {
                let mut reader = RowReader {
                    session,
                    row: selection,
                };
                projection(&mut reader).map(Some)
            }
            RowMapper::Entity(convert) => {
                let raw = if self.has_reference {
                    session.host.get_property(selection, names::REF)?
                } else {
                    RemoteValue::Handle(selection)
                };
                let value = session.map_from_remote(raw, FieldType::Entity(self.entity_type.name))?;
                convert(value).map(Some)
            }
        }
    }

    fn release(&mut self) {
        let Some((result, selection)) = self.cursor.take() else {
            return;
        };
        if !self.context.config.release_cursors {
            return;
        }
        match self.context.state.try_borrow_mut() {
            Ok(mut state) => {
                state.host.release(selection);
                state.host.release(result);
                trace!(entity = self.entity_type.name, "cursor released");
            }
            Err(_) => warn!(entity = self.entity_type.name, "host busy, cursor not released"),
        }
    }
}

impl<H: RemoteHost, R> Iterator for QueryResults<'_, H, R> {
    type Item = Result<R, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, selection) = self.cursor?;
        match self.fetch(selection) {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.release();
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<H: RemoteHost, R> Drop for QueryResults<'_, H, R> {
    fn drop(&mut self) {
        self.release();
    }
}
