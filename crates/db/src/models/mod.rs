//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//!
//! Status and type columns are TEXT validated against the `scribe-core`
//! enums at the engine boundary.

pub mod batch_operation;
pub mod document;
pub mod operation_log;
