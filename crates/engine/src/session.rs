use onebridge_core::TypeRegistry;
use onebridge_host::{EnumMapper, MetadataAccessor, RemoteHost};

/// Mutable per-context state: the host binding and the lookup caches that
/// sit in front of it.
pub(crate) struct State<H> {
    pub host: H,
    pub enums: EnumMapper,
    pub metadata: MetadataAccessor,
}

/// Borrowed view over a context used by the marshaller, the save path and
/// query iteration.
pub struct Session<'a> {
    pub(crate) host: &'a mut dyn RemoteHost,
    pub(crate) registry: &'a TypeRegistry,
    pub(crate) enums: &'a mut EnumMapper,
    pub(crate) metadata: &'a mut MetadataAccessor,
}

impl<'a> Session<'a> {
    pub(crate) fn new<H: RemoteHost>(state: &'a mut State<H>, registry: &'a TypeRegistry) -> Self {
        Self {
            host: &mut state.host,
            registry,
            enums: &mut state.enums,
            metadata: &mut state.metadata,
        }
    }

    pub fn host(&mut self) -> &mut dyn RemoteHost {
        &mut *self.host
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }
}
