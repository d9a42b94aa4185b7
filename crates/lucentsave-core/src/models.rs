//! Core data models used throughout Lucentsave.
//!
//! These types represent saved documents, their list projections, users,
//! and the ephemeral embedding jobs that flow through the pipeline.

use serde::Serialize;

/// Identifier of a saved document.
pub type DocumentId = i64;

/// Identifier of a user account.
pub type UserId = i64;

/// Fields weighted into a document's embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Url,
    Body,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Url => "url",
            Field::Body => "body",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/liked flags of a document.
///
/// Construct through [`DocumentStatus::new`], which enforces that a liked
/// document is always read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    pub is_read: bool,
    pub is_liked: bool,
}

impl DocumentStatus {
    /// Normalizes `liked` to `false` when `read` is `false`.
    pub fn new(is_read: bool, is_liked: bool) -> Self {
        Self {
            is_read,
            is_liked: is_liked && is_read,
        }
    }
}

/// A document as submitted by its owner, before it has an id.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: UserId,
    pub url: String,
    pub title: String,
    pub body: String,
    /// Unix seconds.
    pub created_at: i64,
}

impl NewDocument {
    /// Combined length of the user-supplied fields, in bytes.
    pub fn content_len(&self) -> usize {
        self.url.len() + self.title.len() + self.body.len()
    }
}

/// A fully stored document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: UserId,
    pub url: String,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub is_liked: bool,
    pub created_at: i64,
    /// Incremented on every content rewrite; embedding writes must match it.
    pub revision: i64,
    /// Last written vector. It stays searchable after a rewrite until the
    /// new revision's vector replaces it.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Revision `embedding` was computed from.
    #[serde(skip)]
    pub embedded_revision: Option<i64>,
}

impl Document {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            url: self.url.clone(),
            title: self.title.clone(),
            is_read: self.is_read,
            is_liked: self.is_liked,
            created_at: self.created_at,
        }
    }

    /// `true` once the stored embedding matches the current revision.
    pub fn embedding_is_current(&self) -> bool {
        self.embedded_revision == Some(self.revision)
    }

    pub fn status(&self) -> DocumentStatus {
        DocumentStatus::new(self.is_read, self.is_liked)
    }

    /// Snapshot of the embeddable content at the current revision.
    pub fn embedding_job(&self) -> EmbeddingJob {
        EmbeddingJob {
            document_id: self.id,
            revision: self.revision,
            title: self.title.clone(),
            url: self.url.clone(),
            body: self.body.clone(),
        }
    }
}

/// Document projection without a body, used for lists and search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub url: String,
    pub title: String,
    pub is_read: bool,
    pub is_liked: bool,
    pub created_at: i64,
}

/// Content of one document revision in flight to the embedding provider.
///
/// Never persisted. The revision travels with the job so the final write
/// can detect that the document changed in the meantime.
#[derive(Debug, Clone)]
pub struct EmbeddingJob {
    pub document_id: DocumentId,
    pub revision: i64,
    pub title: String,
    pub url: String,
    pub body: String,
}

impl EmbeddingJob {
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Url => &self.url,
            Field::Body => &self.body,
        }
    }
}

/// A user account row.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liked_requires_read() {
        let status = DocumentStatus::new(false, true);
        assert!(!status.is_read);
        assert!(!status.is_liked);
    }

    #[test]
    fn test_read_and_liked_kept() {
        let status = DocumentStatus::new(true, true);
        assert!(status.is_read && status.is_liked);
        assert_eq!(DocumentStatus::new(true, false).is_liked, false);
    }

    #[test]
    fn test_content_len_sums_fields() {
        let doc = NewDocument {
            owner_id: 1,
            url: "https://a.b".to_string(),
            title: "T".to_string(),
            body: "hello".to_string(),
            created_at: 0,
        };
        assert_eq!(doc.content_len(), 11 + 1 + 5);
    }
}
