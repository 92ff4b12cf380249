pub mod fixtures;
pub mod memory;

pub use memory::{Call, MemoryHost, ObjectSchema, WriteRecord};
