//! Remote document types and the document client contract.
//!
//! The engine never talks to the network itself. It drives a
//! [`DocumentClient`], which owns transport and encryption and hands back
//! decrypted content together with the server's version counter.

use crate::error::{ClientError, ClientResult};
use crate::{Uid, Version};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A versioned document as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document<T> {
    /// Server-assigned identifier, stable for the lifetime of the document
    pub uid: Uid,
    /// Incremented on every successful write, starting at 1
    pub version: Version,
    /// Decrypted content
    pub content: T,
}

impl<T> Document<T> {
    /// Create a document at version 1.
    pub fn new(uid: impl Into<Uid>, content: T) -> Self {
        Self {
            uid: uid.into(),
            version: 1,
            content,
        }
    }
}

/// Options for [`DocumentClient::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Maximum number of documents to return
    pub limit: Option<usize>,
}

impl ListOptions {
    /// List at most `limit` documents.
    pub fn limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

/// Access to one logical collection of encrypted documents.
///
/// Implementations perform encryption, decryption and network I/O. They are
/// responsible for their own timeouts.
#[async_trait]
pub trait DocumentClient<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Fetch a document by uid. Fails with [`ClientError::NotFound`] if it
    /// no longer exists.
    async fn get(&self, uid: &str) -> ClientResult<Document<T>>;

    /// List documents in the collection.
    async fn list(&self, options: ListOptions) -> ClientResult<Vec<Document<T>>>;

    /// Create a document. The server assigns the uid and version 1.
    async fn create(&self, content: T) -> ClientResult<Document<T>>;

    /// Replace a document's content if its version still equals
    /// `expected_version`, otherwise fail with [`ClientError::Conflict`].
    async fn replace(
        &self,
        uid: &str,
        content: T,
        expected_version: Version,
    ) -> ClientResult<Document<T>>;
}

/// An in-process collection enforcing the same versioning rules as the
/// vault server.
#[derive(Debug)]
pub struct InMemoryCollection<T> {
    documents: Mutex<Vec<Document<T>>>,
}

impl<T: Clone> InMemoryCollection<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
        }
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    /// Check if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete a document, as another device or an operator might.
    pub fn remove(&self, uid: &str) -> Option<Document<T>> {
        let mut documents = self.documents.lock();
        let index = documents.iter().position(|d| d.uid == uid)?;
        Some(documents.remove(index))
    }

    /// Look up a document without going through the async client API.
    pub fn find(&self, uid: &str) -> ClientResult<Document<T>> {
        self.documents
            .lock()
            .iter()
            .find(|d| d.uid == uid)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(uid.to_string()))
    }

    /// All documents in creation order, truncated to `options.limit`.
    pub fn documents(&self, options: ListOptions) -> Vec<Document<T>> {
        let documents = self.documents.lock();
        let limit = options.limit.unwrap_or(documents.len());
        documents.iter().take(limit).cloned().collect()
    }

    /// Insert a new document with a fresh uid.
    pub fn insert(&self, content: T) -> Document<T> {
        let document = Document::new(uuid::Uuid::new_v4().to_string(), content);
        self.documents.lock().push(document.clone());
        document
    }

    /// Compare-and-swap the content of an existing document.
    pub fn compare_and_replace(
        &self,
        uid: &str,
        content: T,
        expected_version: Version,
    ) -> ClientResult<Document<T>> {
        let mut documents = self.documents.lock();
        let document = documents
            .iter_mut()
            .find(|d| d.uid == uid)
            .ok_or_else(|| ClientError::NotFound(uid.to_string()))?;

        if document.version != expected_version {
            return Err(ClientError::Conflict {
                server_version: document.version,
            });
        }

        document.version += 1;
        document.content = content;
        Ok(document.clone())
    }
}

impl<T: Clone> Default for InMemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> DocumentClient<T> for InMemoryCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, uid: &str) -> ClientResult<Document<T>> {
        self.find(uid)
    }

    async fn list(&self, options: ListOptions) -> ClientResult<Vec<Document<T>>> {
        Ok(self.documents(options))
    }

    async fn create(&self, content: T) -> ClientResult<Document<T>> {
        Ok(self.insert(content))
    }

    async fn replace(
        &self,
        uid: &str,
        content: T,
        expected_version: Version,
    ) -> ClientResult<Document<T>> {
        self.compare_and_replace(uid, content, expected_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn create_get_replace_roundtrip() {
        let collection: InMemoryCollection<Value> = InMemoryCollection::new();

        let created = collection.create(json!({"x": 1})).await.unwrap();
        assert_eq!(created.version, 1);

        let fetched = collection.get(&created.uid).await.unwrap();
        assert_eq!(fetched.content, json!({"x": 1}));
        assert_eq!(fetched.version, 1);

        collection
            .replace(&created.uid, json!({"x": 2}), 1)
            .await
            .unwrap();
        let fetched = collection.get(&created.uid).await.unwrap();
        assert_eq!(fetched.content, json!({"x": 2}));
        assert_eq!(fetched.version, 2);

        let stale = collection.replace(&created.uid, json!({"x": 3}), 1).await;
        assert_eq!(stale, Err(ClientError::Conflict { server_version: 2 }));

        // The rejected write must not have touched the stored content.
        let fetched = collection.get(&created.uid).await.unwrap();
        assert_eq!(fetched.content, json!({"x": 2}));
    }

    #[tokio::test]
    async fn get_unknown_uid() {
        let collection: InMemoryCollection<Value> = InMemoryCollection::new();
        let result = collection.get("missing").await;
        assert_eq!(result, Err(ClientError::NotFound("missing".into())));

        let result = collection.replace("missing", json!({}), 1).await;
        assert_eq!(result, Err(ClientError::NotFound("missing".into())));
    }

    #[tokio::test]
    async fn list_respects_limit_and_order() {
        let collection: InMemoryCollection<Value> = InMemoryCollection::new();
        let first = collection.create(json!(1)).await.unwrap();
        collection.create(json!(2)).await.unwrap();
        collection.create(json!(3)).await.unwrap();

        let all = collection.list(ListOptions::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].uid, first.uid);

        let one = collection.list(ListOptions::limit(1)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].content, json!(1));
    }

    #[test]
    fn remove_document() {
        let collection: InMemoryCollection<Value> = InMemoryCollection::new();
        let doc = collection.insert(json!({"a": 1}));
        assert_eq!(collection.len(), 1);

        assert!(collection.remove(&doc.uid).is_some());
        assert!(collection.is_empty());
        assert!(collection.remove(&doc.uid).is_none());
    }

    #[test]
    fn document_serialization() {
        let doc = Document::new("doc-1", json!({"a": 1}));
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"uid":"doc-1","version":1,"content":{"a":1}}"#);
    }
}
