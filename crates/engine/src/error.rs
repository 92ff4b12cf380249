use onebridge_core::CoreError;
use onebridge_host::HostError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("cycle detected for entity type [{entity}]: [{chain}]")]
    CycleDetected { entity: &'static str, chain: String },

    #[error("error writing [{configuration_name}] with argument [{argument}]")]
    WriteFailed {
        configuration_name: String,
        argument: String,
        #[source]
        cause: HostError,
    },

    #[error("remote call failed while saving [{path}]")]
    Remote {
        path: String,
        #[source]
        source: HostError,
    },

    #[error("can't resolve type by remote type [{0}]")]
    UnknownRemoteType(String),

    #[error("type [{0}] has no configuration name")]
    UnknownConfigurationType(&'static str),

    #[error("type [{0}] has no id")]
    MissingIdentityProperty(String),

    #[error("lists of [{0}] are not supported, only lists of entities")]
    UnsupportedListElementType(String),

    #[error("unexpected entity kind [{0}]")]
    UnsupportedEntityKind(String),

    #[error("referenced [{0}] has never been saved and has no changes")]
    UnsavedReference(&'static str),

    #[error("invalid remote value for {expected}: {message}")]
    InvalidRemoteValue { expected: String, message: String },

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}
