//! Database operations for the documents table.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use vault_sync::Document;

/// A stored document row from the database.
#[derive(Debug)]
pub struct StoredDocument {
    pub uid: String,
    pub owner: String,
    pub version: i64,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            uid: row.try_get("uid")?,
            owner: row.try_get("owner")?,
            version: row.try_get("version")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredDocument {
    /// Convert database row to the wire document.
    pub fn into_document(self) -> Document<Value> {
        Document {
            uid: self.uid,
            version: self.version as u64,
            content: self.content,
        }
    }
}

/// Outcome of a compare-and-swap update.
#[derive(Debug)]
pub enum ReplaceOutcome {
    Replaced(StoredDocument),
    Conflict { server_version: i64 },
    NotFound,
}

/// List an owner's documents, oldest first.
pub async fn list_documents(
    pool: &PgPool,
    owner: &str,
    limit: i64,
) -> Result<Vec<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT uid, owner, version, content, created_at, updated_at
        FROM documents
        WHERE owner = $1
        ORDER BY created_at ASC, uid ASC
        LIMIT $2
        "#,
    )
    .bind(owner)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Get one of an owner's documents.
pub async fn get_document(
    pool: &PgPool,
    owner: &str,
    uid: &str,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT uid, owner, version, content, created_at, updated_at
        FROM documents
        WHERE owner = $1 AND uid = $2
        "#,
    )
    .bind(owner)
    .bind(uid)
    .fetch_optional(pool)
    .await
}

/// Insert a new document at version 1.
pub async fn insert_document(
    pool: &PgPool,
    owner: &str,
    uid: &str,
    content: &Value,
) -> Result<StoredDocument, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        INSERT INTO documents (uid, owner, version, content)
        VALUES ($1, $2, 1, $3)
        RETURNING uid, owner, version, content, created_at, updated_at
        "#,
    )
    .bind(uid)
    .bind(owner)
    .bind(content)
    .fetch_one(pool)
    .await
}

/// Replace a document's content if it is still at `expected_version`.
pub async fn replace_document(
    pool: &PgPool,
    owner: &str,
    uid: &str,
    content: &Value,
    expected_version: i64,
) -> Result<ReplaceOutcome, sqlx::Error> {
    let updated = sqlx::query_as::<_, StoredDocument>(
        r#"
        UPDATE documents
        SET content = $4, version = version + 1, updated_at = NOW()
        WHERE owner = $1 AND uid = $2 AND version = $3
        RETURNING uid, owner, version, content, created_at, updated_at
        "#,
    )
    .bind(owner)
    .bind(uid)
    .bind(expected_version)
    .bind(content)
    .fetch_optional(pool)
    .await?;

    if let Some(document) = updated {
        return Ok(ReplaceOutcome::Replaced(document));
    }

    // Zero rows: either the version moved on or the document is gone.
    let current = get_document(pool, owner, uid).await?;
    Ok(match current {
        Some(document) => ReplaceOutcome::Conflict {
            server_version: document.version,
        },
        None => ReplaceOutcome::NotFound,
    })
}
