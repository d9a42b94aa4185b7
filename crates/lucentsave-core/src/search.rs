//! Owner-scoped retrieval over the [`Store`] trait.
//!
//! The calling application embeds the query text (see
//! [`EmbeddingClient::embed_text`](crate::embedding::EmbeddingClient::embed_text))
//! and passes the vector here. Stored embeddings are unit length, so the
//! store ranks by inner product.
//!
//! Documents without an embedding yet are excluded from semantic results.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{DocumentSummary, UserId};
use crate::store::Store;

/// Default number of semantic results.
pub const DEFAULT_LIMIT: usize = 20;

/// Upper bound on any requested limit.
pub const MAX_LIMIT: usize = 100;

/// A ranked search hit. `rank` starts at 1.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub rank: usize,
    #[serde(flatten)]
    pub document: DocumentSummary,
}

/// Semantic and keyword search, always scoped to one owner.
#[derive(Clone)]
pub struct SearchService {
    store: Arc<dyn Store>,
    dims: usize,
}

impl SearchService {
    /// `dims` is the embedding dimensionality query vectors must have.
    pub fn new(store: Arc<dyn Store>, dims: usize) -> Self {
        Self { store, dims }
    }

    /// Rank `owner_id`'s documents by similarity to `query`.
    ///
    /// `limit` is clamped to `1..=MAX_LIMIT`.
    pub async fn search_by_embedding(
        &self,
        owner_id: UserId,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query.len() != self.dims {
            return Err(Error::validation(format!(
                "query embedding has {} dimensions, expected {}",
                query.len(),
                self.dims
            )));
        }
        let docs = self
            .store
            .query_nearest(owner_id, query, clamp_limit(limit))
            .await?;
        Ok(ranked(docs))
    }

    /// Lexical fallback. Blank queries return no results.
    pub async fn search_by_keyword(
        &self,
        owner_id: UserId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .store
            .query_keyword(owner_id, query.trim(), clamp_limit(limit))
            .await?;
        Ok(ranked(docs))
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LIMIT)
}

fn ranked(docs: Vec<DocumentSummary>) -> Vec<SearchResult> {
    docs.into_iter()
        .enumerate()
        .map(|(i, document)| SearchResult {
            rank: i + 1,
            document,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewDocument;
    use crate::store::memory::InMemoryStore;

    async fn add(store: &InMemoryStore, owner: UserId, title: &str, emb: Option<[f32; 2]>) -> i64 {
        let doc = store
            .save_document(&NewDocument {
                owner_id: owner,
                url: format!("https://example.com/{}", title),
                title: title.to_string(),
                body: format!("{} body", title),
                created_at: 0,
            })
            .await
            .unwrap();
        if let Some(v) = emb {
            store.set_embedding(doc.id, doc.revision, &v).await.unwrap();
        }
        doc.id
    }

    #[tokio::test]
    async fn test_ranks_by_similarity() {
        let store = Arc::new(InMemoryStore::new());
        let near = add(&store, 1, "near", Some([1.0, 0.0])).await;
        let far = add(&store, 1, "far", Some([0.0, 1.0])).await;
        let mid = add(&store, 1, "mid", Some([0.7071, 0.7071])).await;

        let svc = SearchService::new(store, 2);
        let results = svc.search_by_embedding(1, &[1.0, 0.0], 20).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.document.id).collect();
        assert_eq!(ids, vec![near, mid, far]);
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_other_owner_never_returned() {
        let store = Arc::new(InMemoryStore::new());
        add(&store, 2, "theirs", Some([1.0, 0.0])).await;
        let mine = add(&store, 1, "mine", Some([-1.0, 0.0])).await;

        let svc = SearchService::new(store, 2);
        let results = svc.search_by_embedding(1, &[1.0, 0.0], 20).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, mine);

        let keyword = svc.search_by_keyword(1, "theirs", 20).await.unwrap();
        assert!(keyword.is_empty());
    }

    #[tokio::test]
    async fn test_unembedded_documents_excluded() {
        let store = Arc::new(InMemoryStore::new());
        add(&store, 1, "pending", None).await;
        let done = add(&store, 1, "done", Some([0.0, 1.0])).await;

        let svc = SearchService::new(store, 2);
        let results = svc.search_by_embedding(1, &[1.0, 0.0], 20).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, done);
    }

    #[tokio::test]
    async fn test_limit_and_dimension_checks() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..5 {
            add(&store, 1, &format!("d{}", i), Some([1.0, 0.0])).await;
        }
        let svc = SearchService::new(store, 2);
        assert_eq!(svc.search_by_embedding(1, &[1.0, 0.0], 2).await.unwrap().len(), 2);
        assert_eq!(svc.search_by_embedding(1, &[1.0, 0.0], 0).await.unwrap().len(), 1);
        assert!(matches!(
            svc.search_by_embedding(1, &[1.0], 20).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_keyword_query_is_empty() {
        let store = Arc::new(InMemoryStore::new());
        add(&store, 1, "anything", None).await;
        let svc = SearchService::new(store, 2);
        assert!(svc.search_by_keyword(1, "   ", 20).await.unwrap().is_empty());
        assert_eq!(svc.search_by_keyword(1, "anything", 20).await.unwrap().len(), 1);
    }
}
