//! The boundary between raw records and DTOs.

pub mod fields;
pub mod mapping;

pub use fields::{LinkField, SCHEMA_VERSION};
pub use mapping::{map_records, FieldReader, FromRecord, NamedRecord, ToFields};
