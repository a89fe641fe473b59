//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod batch_operation_repo;
pub mod document_repo;
pub mod operation_log_repo;

pub use batch_operation_repo::BatchOperationRepo;
pub use document_repo::DocumentRepo;
pub use operation_log_repo::OperationLogRepo;
