//! Storage abstraction for Lucentsave.
//!
//! The [`Store`] trait defines every persistence operation the pipeline,
//! search and account flows need, enabling pluggable backends (SQLite,
//! in-memory).
//!
//! Every document-scoped call except [`Store::set_embedding`] takes the
//! owner id and must filter on it. `set_embedding` is keyed by document id
//! and revision only, because it is written by the background pipeline
//! after ownership was checked at save time.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Document, DocumentId, DocumentStatus, DocumentSummary, EmbeddingJob, NewDocument, UserId,
    UserRecord,
};

/// Returned (inside `anyhow::Error`) by [`Store::create_user`] when the
/// email already belongs to an account.
#[derive(Debug, thiserror::Error)]
#[error("email already in use")]
pub struct EmailTaken;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_document`](Store::save_document) | Insert a document (revision 1, no embedding) |
/// | [`get_document`](Store::get_document) | Owner-scoped fetch with body |
/// | [`list_documents`](Store::list_documents) | Owner's read or unread documents, newest first |
/// | [`update_status`](Store::update_status) | Set read/liked flags |
/// | [`update_body`](Store::update_body) | Rewrite the body, bumping the revision |
/// | [`replace_content`](Store::replace_content) | Rewrite title and body (rescrape), bumping the revision |
/// | [`delete_document`](Store::delete_document) | Owner-scoped delete |
/// | [`set_embedding`](Store::set_embedding) | Revision-checked embedding write |
/// | [`query_nearest`](Store::query_nearest) | Inner-product ranking over embedded documents |
/// | [`query_keyword`](Store::query_keyword) | Full-text ranking |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new document and return it with its assigned id.
    async fn save_document(&self, doc: &NewDocument) -> Result<Document>;

    /// Fetch a document if it exists and belongs to `owner_id`.
    async fn get_document(&self, id: DocumentId, owner_id: UserId) -> Result<Option<Document>>;

    /// List `owner_id`'s documents with `is_read == read`, newest first.
    async fn list_documents(&self, owner_id: UserId, read: bool) -> Result<Vec<DocumentSummary>>;

    /// Set the read/liked flags. Returns `false` when no owned row matched.
    async fn update_status(
        &self,
        id: DocumentId,
        owner_id: UserId,
        status: DocumentStatus,
    ) -> Result<bool>;

    /// Replace the body and bump the revision. The previous embedding stays
    /// in place until [`Store::set_embedding`] lands for the new revision.
    /// Returns the updated document, `None` if no owned row matched.
    async fn update_body(
        &self,
        id: DocumentId,
        owner_id: UserId,
        body: &str,
    ) -> Result<Option<Document>>;

    /// Replace title and body regardless of owner (maintenance path). Bumps
    /// the revision like [`Store::update_body`].
    async fn replace_content(
        &self,
        id: DocumentId,
        title: &str,
        body: &str,
    ) -> Result<Option<Document>>;

    /// Delete an owned document. Returns `false` when no owned row matched.
    async fn delete_document(&self, id: DocumentId, owner_id: UserId) -> Result<bool>;

    /// Store the embedding for document `id` at `revision`.
    ///
    /// Returns `false` (zero rows affected) when the document is gone or
    /// its revision moved on. That outcome is not an error.
    async fn set_embedding(&self, id: DocumentId, revision: i64, vector: &[f32]) -> Result<bool>;

    /// Rank `owner_id`'s embedded documents by descending inner product with
    /// `vector`. Documents without an embedding are excluded.
    async fn query_nearest(
        &self,
        owner_id: UserId,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentSummary>>;

    /// Full-text search over `owner_id`'s titles and bodies, best first.
    async fn query_keyword(
        &self,
        owner_id: UserId,
        text: &str,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>>;

    /// Jobs for documents whose embedding is missing or older than their
    /// current revision, oldest first.
    async fn pending_embeddings(&self, limit: usize) -> Result<Vec<EmbeddingJob>>;

    /// Documents whose body is empty, as `(id, url)` pairs.
    async fn documents_with_empty_body(&self) -> Result<Vec<(DocumentId, String)>>;

    /// Look up a user by email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Create a user and return its id. Fails with [`EmailTaken`] if the
    /// email is taken.
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserId>;
}
