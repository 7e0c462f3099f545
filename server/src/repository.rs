//! Document storage backends.
//!
//! Every operation is scoped to an owner: a user only ever sees the
//! documents they created. Content is stored as opaque JSON.

use crate::db::{self, Pool, ReplaceOutcome};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use vault_sync::{Document, DocumentClient, InMemoryCollection, ListOptions};

/// Versioned document storage with optimistic concurrency.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Up to `limit` of the owner's documents, oldest first.
    async fn list(&self, owner: &str, limit: usize) -> Result<Vec<Document<Value>>>;

    async fn get(&self, owner: &str, uid: &str) -> Result<Document<Value>>;

    /// Store a new document at version 1 under a fresh uid.
    async fn create(&self, owner: &str, content: Value) -> Result<Document<Value>>;

    /// Replace content if the stored version still equals
    /// `expected_version`, else fail with [`AppError::Conflict`].
    async fn replace(
        &self,
        owner: &str,
        uid: &str,
        content: Value,
        expected_version: u64,
    ) -> Result<Document<Value>>;
}

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn list(&self, owner: &str, limit: usize) -> Result<Vec<Document<Value>>> {
        let rows = db::list_documents(&self.pool, owner, limit as i64).await?;
        Ok(rows.into_iter().map(|row| row.into_document()).collect())
    }

    async fn get(&self, owner: &str, uid: &str) -> Result<Document<Value>> {
        db::get_document(&self.pool, owner, uid)
            .await?
            .map(|row| row.into_document())
            .ok_or_else(|| AppError::NotFound(uid.to_string()))
    }

    async fn create(&self, owner: &str, content: Value) -> Result<Document<Value>> {
        let uid = uuid::Uuid::new_v4().to_string();
        let row = db::insert_document(&self.pool, owner, &uid, &content).await?;
        Ok(row.into_document())
    }

    async fn replace(
        &self,
        owner: &str,
        uid: &str,
        content: Value,
        expected_version: u64,
    ) -> Result<Document<Value>> {
        let expected = i64::try_from(expected_version)
            .map_err(|_| AppError::BadRequest("expectedVersion out of range".to_string()))?;

        match db::replace_document(&self.pool, owner, uid, &content, expected).await? {
            ReplaceOutcome::Replaced(row) => Ok(row.into_document()),
            ReplaceOutcome::Conflict { server_version } => Err(AppError::Conflict {
                server_version: server_version as u64,
            }),
            ReplaceOutcome::NotFound => Err(AppError::NotFound(uid.to_string())),
        }
    }
}

/// In-process repository for development and tests.
///
/// Each owner gets an [`InMemoryCollection`], which enforces the same
/// versioning rules as the database backend.
#[derive(Default)]
pub struct MemoryDocumentRepository {
    collections: DashMap<String, Arc<InMemoryCollection<Value>>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// The owner's collection, if they ever created a document.
    fn collection(&self, owner: &str) -> Option<Arc<InMemoryCollection<Value>>> {
        self.collections.get(owner).map(|c| c.value().clone())
    }

    /// Number of owners holding a collection.
    pub fn owner_count(&self) -> usize {
        self.collections.len()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn list(&self, owner: &str, limit: usize) -> Result<Vec<Document<Value>>> {
        match self.collection(owner) {
            Some(collection) => Ok(collection.list(ListOptions::limit(limit)).await?),
            None => Ok(Vec::new()),
        }
    }

    async fn get(&self, owner: &str, uid: &str) -> Result<Document<Value>> {
        let collection = self
            .collection(owner)
            .ok_or_else(|| AppError::NotFound(uid.to_string()))?;
        Ok(collection.get(uid).await?)
    }

    async fn create(&self, owner: &str, content: Value) -> Result<Document<Value>> {
        let collection = self
            .collections
            .entry(owner.to_string())
            .or_default()
            .clone();
        Ok(collection.create(content).await?)
    }

    async fn replace(
        &self,
        owner: &str,
        uid: &str,
        content: Value,
        expected_version: u64,
    ) -> Result<Document<Value>> {
        let collection = self
            .collection(owner)
            .ok_or_else(|| AppError::NotFound(uid.to_string()))?;
        Ok(collection.replace(uid, content, expected_version).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_repository_scopes_by_owner() {
        let repo = MemoryDocumentRepository::new();
        let alice = repo.create("alice", json!({"a": 1})).await.unwrap();

        assert_eq!(repo.list("alice", 10).await.unwrap().len(), 1);
        assert!(repo.list("bob", 10).await.unwrap().is_empty());
        assert!(matches!(
            repo.get("bob", &alice.uid).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(repo.owner_count(), 1);
    }

    #[tokio::test]
    async fn reads_do_not_allocate_owner_collections() {
        let repo = MemoryDocumentRepository::new();
        for n in 0..50 {
            let owner = format!("token-{}", n);
            assert!(repo.list(&owner, 10).await.unwrap().is_empty());
            assert!(matches!(repo.get(&owner, "x").await, Err(AppError::NotFound(_))));
            assert!(matches!(
                repo.replace(&owner, "x", json!({}), 1).await,
                Err(AppError::NotFound(_))
            ));
        }
        assert_eq!(repo.owner_count(), 0);

        repo.create("alice", json!({})).await.unwrap();
        assert_eq!(repo.owner_count(), 1);
    }

    #[tokio::test]
    async fn memory_repository_enforces_versions() {
        let repo = MemoryDocumentRepository::new();
        let doc = repo.create("alice", json!({"a": 1})).await.unwrap();
        assert_eq!(doc.version, 1);

        let replaced = repo
            .replace("alice", &doc.uid, json!({"a": 2}), 1)
            .await
            .unwrap();
        assert_eq!(replaced.version, 2);

        let stale = repo.replace("alice", &doc.uid, json!({"a": 3}), 1).await;
        assert!(matches!(stale, Err(AppError::Conflict { server_version: 2 })));

        let missing = repo.replace("alice", "nope", json!({}), 1).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
