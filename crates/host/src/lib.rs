pub mod enums;
pub mod error;
pub mod global;
pub mod metadata;
pub mod traits;

pub use enums::EnumMapper;
pub use error::HostError;
pub use global::{DocumentWriteMode, names};
pub use metadata::MetadataAccessor;
pub use traits::*;
