//! Document row mapping for the Postgres document store adapter.

use scribe_core::document::Document;
use scribe_core::types::Timestamp;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `documents` table.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub position: i32,
    pub title: String,
    pub fields: serde_json::Value,
    pub version: i64,
    pub deleted_at: Option<Timestamp>,
    pub deleted_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            project_id: row.project_id,
            parent_id: row.parent_id,
            position: row.position,
            title: row.title,
            fields: row.fields,
            version: row.version,
            deleted_at: row.deleted_at,
            deleted_by: row.deleted_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
