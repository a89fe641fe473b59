/// Engine-owned rows (batch operations, items, ledger entries) use
/// PostgreSQL BIGSERIAL primary keys.
pub type DbId = i64;

/// Documents and projects are identified by UUIDs minted by the
/// document store.
pub type DocumentId = uuid::Uuid;

/// Project identifier, same id space as documents.
pub type ProjectId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
