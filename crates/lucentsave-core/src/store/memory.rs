//! In-memory [`Store`] implementation for tests.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Vector
//! search is a brute-force inner product over the owner's embedded
//! documents. Keyword search counts matching terms.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Document, DocumentId, DocumentStatus, DocumentSummary, EmbeddingJob, NewDocument, UserId,
    UserRecord,
};
use crate::vector::inner_product;

use super::{EmailTaken, Store};

#[derive(Default)]
struct Inner {
    docs: HashMap<DocumentId, Document>,
    users: Vec<UserRecord>,
    next_doc_id: DocumentId,
    embedding_writes: usize,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of `set_embedding` calls that changed a row.
    pub fn embedding_writes(&self) -> usize {
        self.inner.read().unwrap().embedding_writes
    }

    /// Number of stored documents across all owners.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(a: &Document, b: &Document) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_document(&self, doc: &NewDocument) -> Result<Document> {
        let mut inner = self.inner.write().unwrap();
        inner.next_doc_id += 1;
        let stored = Document {
            id: inner.next_doc_id,
            owner_id: doc.owner_id,
            url: doc.url.clone(),
            title: doc.title.clone(),
            body: doc.body.clone(),
            is_read: false,
            is_liked: false,
            created_at: doc.created_at,
            revision: 1,
            embedding: None,
            embedded_revision: None,
        };
        inner.docs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_document(&self, id: DocumentId, owner_id: UserId) -> Result<Option<Document>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .docs
            .get(&id)
            .filter(|d| d.owner_id == owner_id)
            .cloned())
    }

    async fn list_documents(&self, owner_id: UserId, read: bool) -> Result<Vec<DocumentSummary>> {
        let inner = self.inner.read().unwrap();
        let mut docs: Vec<&Document> = inner
            .docs
            .values()
            .filter(|d| d.owner_id == owner_id && d.is_read == read)
            .collect();
        docs.sort_by(|a, b| newest_first(a, b));
        Ok(docs.into_iter().map(Document::summary).collect())
    }

    async fn update_status(
        &self,
        id: DocumentId,
        owner_id: UserId,
        status: DocumentStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.docs.get_mut(&id).filter(|d| d.owner_id == owner_id) {
            Some(doc) => {
                doc.is_read = status.is_read;
                doc.is_liked = status.is_liked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_body(
        &self,
        id: DocumentId,
        owner_id: UserId,
        body: &str,
    ) -> Result<Option<Document>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner
            .docs
            .get_mut(&id)
            .filter(|d| d.owner_id == owner_id)
            .map(|doc| {
                doc.body = body.to_string();
                doc.revision += 1;
                doc.clone()
            }))
    }

    async fn replace_content(
        &self,
        id: DocumentId,
        title: &str,
        body: &str,
    ) -> Result<Option<Document>> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.docs.get_mut(&id).map(|doc| {
            doc.title = title.to_string();
            doc.body = body.to_string();
            doc.revision += 1;
            doc.clone()
        }))
    }

    async fn delete_document(&self, id: DocumentId, owner_id: UserId) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let owned = inner.docs.get(&id).is_some_and(|d| d.owner_id == owner_id);
        if owned {
            inner.docs.remove(&id);
        }
        Ok(owned)
    }

    async fn set_embedding(&self, id: DocumentId, revision: i64, vector: &[f32]) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let applied = match inner.docs.get_mut(&id).filter(|d| d.revision == revision) {
            Some(doc) => {
                doc.embedding = Some(vector.to_vec());
                doc.embedded_revision = Some(revision);
                true
            }
            None => false,
        };
        if applied {
            inner.embedding_writes += 1;
        }
        Ok(applied)
    }

    async fn query_nearest(
        &self,
        owner_id: UserId,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        let inner = self.inner.read().unwrap();
        let mut scored: Vec<(f32, &Document)> = inner
            .docs
            .values()
            .filter(|d| d.owner_id == owner_id)
            .filter_map(|d| {
                let emb = d.embedding.as_deref()?;
                inner_product(vector, emb).map(|score| (score, d))
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| newest_first(a, b))
        });
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, d)| d.summary()).collect())
    }

    async fn query_keyword(
        &self,
        owner_id: UserId,
        text: &str,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        let query_lower = text.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().unwrap();
        let mut scored: Vec<(usize, &Document)> = inner
            .docs
            .values()
            .filter(|d| d.owner_id == owner_id)
            .filter_map(|d| {
                let haystack = format!("{} {}", d.title, d.body).to_lowercase();
                let matches = terms.iter().filter(|t| haystack.contains(*t)).count();
                (matches > 0).then_some((matches, d))
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| newest_first(a, b)));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, d)| d.summary()).collect())
    }

    async fn pending_embeddings(&self, limit: usize) -> Result<Vec<EmbeddingJob>> {
        let inner = self.inner.read().unwrap();
        let mut docs: Vec<&Document> = inner
            .docs
            .values()
            .filter(|d| !d.embedding_is_current())
            .collect();
        docs.sort_by_key(|d| d.id);
        Ok(docs
            .into_iter()
            .take(limit)
            .map(Document::embedding_job)
            .collect())
    }

    async fn documents_with_empty_body(&self) -> Result<Vec<(DocumentId, String)>> {
        let inner = self.inner.read().unwrap();
        let mut out: Vec<(DocumentId, String)> = inner
            .docs
            .values()
            .filter(|d| d.body.is_empty())
            .map(|d| (d.id, d.url.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserId> {
        let mut inner = self.inner.write().unwrap();
        if inner.users.iter().any(|u| u.email == email) {
            return Err(EmailTaken.into());
        }
        let id = inner.users.len() as UserId + 1;
        inner.users.push(UserRecord {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(id)
    }
}
