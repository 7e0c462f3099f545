//! Document handlers - versioned reads and writes for one owner.

use crate::error::{AppError, Result};
use crate::repository::DocumentRepository;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vault_sync::Document;

/// Query parameters for listing documents.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Maximum number of documents to return
    pub limit: Option<usize>,
}

/// Response for listing documents.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub documents: Vec<Document<Value>>,
}

/// Request body for creating a document.
#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    /// Encrypted document content
    pub content: Value,
}

/// Request body for replacing a document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceRequest {
    pub content: Value,
    /// Version the client last observed
    pub expected_version: u64,
}

/// List the owner's documents, oldest first.
pub async fn handle_list(
    repo: &dyn DocumentRepository,
    owner: &str,
    query: ListQuery,
    max_limit: usize,
) -> Result<ListResponse> {
    let limit = query
        .limit
        .map(|l| l.clamp(1, max_limit))
        .unwrap_or(max_limit);

    let documents = repo.list(owner, limit).await?;
    Ok(ListResponse { documents })
}

pub async fn handle_get(
    repo: &dyn DocumentRepository,
    owner: &str,
    uid: &str,
) -> Result<Document<Value>> {
    repo.get(owner, uid).await
}

/// Store a new document at version 1.
pub async fn handle_create(
    repo: &dyn DocumentRepository,
    owner: &str,
    request: CreateRequest,
) -> Result<Document<Value>> {
    if request.content.is_null() {
        return Err(AppError::BadRequest("content is required".to_string()));
    }

    let document = repo.create(owner, request.content).await?;
    tracing::info!(doc_uid = %document.uid, "Created document");
    Ok(document)
}

/// Replace a document under optimistic concurrency.
pub async fn handle_replace(
    repo: &dyn DocumentRepository,
    owner: &str,
    uid: &str,
    request: ReplaceRequest,
) -> Result<Document<Value>> {
    if request.content.is_null() {
        return Err(AppError::BadRequest("content is required".to_string()));
    }

    match repo
        .replace(owner, uid, request.content, request.expected_version)
        .await
    {
        Ok(document) => {
            tracing::debug!(doc_uid = %uid, version = document.version, "Replaced document");
            Ok(document)
        }
        Err(AppError::Conflict { server_version }) => {
            tracing::info!(
                doc_uid = %uid,
                expected_version = request.expected_version,
                server_version,
                "Rejected stale write"
            );
            Err(AppError::Conflict { server_version })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryDocumentRepository;
    use serde_json::json;

    #[tokio::test]
    async fn list_limit_is_clamped() {
        let repo = MemoryDocumentRepository::new();
        for n in 0..5 {
            repo.create("alice", json!({ "n": n })).await.unwrap();
        }

        let all = handle_list(&repo, "alice", ListQuery::default(), 3)
            .await
            .unwrap();
        assert_eq!(all.documents.len(), 3);

        let zero = handle_list(&repo, "alice", ListQuery { limit: Some(0) }, 3)
            .await
            .unwrap();
        assert_eq!(zero.documents.len(), 1);
        assert_eq!(zero.documents[0].content, json!({"n": 0}));
    }

    #[tokio::test]
    async fn version_zero_is_a_conflict() {
        let repo = MemoryDocumentRepository::new();
        let doc = repo.create("alice", json!({})).await.unwrap();

        let request = ReplaceRequest {
            content: json!({"a": 1}),
            expected_version: 0,
        };
        let result = handle_replace(&repo, "alice", &doc.uid, request).await;
        assert!(matches!(result, Err(AppError::Conflict { server_version: 1 })));
    }

    #[tokio::test]
    async fn create_requires_content() {
        let repo = MemoryDocumentRepository::new();
        let result = handle_create(&repo, "alice", CreateRequest { content: Value::Null }).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
