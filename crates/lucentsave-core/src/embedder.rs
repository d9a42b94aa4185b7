//! Document-level embedding: three fields in, one stored vector out.
//!
//! [`DocumentEmbedder::embed_document`] embeds title, url and body
//! concurrently, waits for all three, combines them with
//! [`FIELD_WEIGHTS`], normalizes, and writes the result through
//! [`Store::set_embedding`].
//!
//! The policy is all-or-nothing: if any field fails, nothing is written, so
//! a stored embedding never mixes vectors from different attempts. A write
//! that matches no row (document deleted, or rewritten since the job was
//! created) is reported as [`EmbedOutcome::Skipped`], not as an error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::embedding::EmbeddingClient;
use crate::error::ProviderError;
use crate::models::{EmbeddingJob, Field};
use crate::store::Store;
use crate::vector::{self, VectorError};

/// Relative weight of each field in the combined vector.
pub const FIELD_WEIGHTS: [(Field, f32); 3] =
    [(Field::Title, 0.25), (Field::Url, 0.15), (Field::Body, 0.60)];

/// What happened to a job that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedOutcome {
    /// The vector was written.
    Stored,
    /// The document was deleted or its revision moved on; nothing written.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding {field} failed: {source}")]
    Field {
        field: Field,
        #[source]
        source: ProviderError,
    },

    #[error("combining field embeddings failed: {0}")]
    Combine(#[from] VectorError),

    #[error("storing embedding failed: {0:#}")]
    Store(anyhow::Error),
}

/// Orchestrates field embedding and persistence for one document at a time.
///
/// Cheap to clone; clones share the provider and store.
#[derive(Clone)]
pub struct DocumentEmbedder {
    client: EmbeddingClient,
    store: Arc<dyn Store>,
}

impl DocumentEmbedder {
    pub fn new(client: EmbeddingClient, store: Arc<dyn Store>) -> Self {
        Self { client, store }
    }

    /// Embed and persist one document revision.
    ///
    /// Failures are logged here and also returned so a caller holding the
    /// job handle can observe them.
    #[tracing::instrument(
        name = "embed_document",
        skip_all,
        fields(document_id = job.document_id, revision = job.revision)
    )]
    pub async fn embed_document(&self, job: &EmbeddingJob) -> Result<EmbedOutcome, EmbedError> {
        let result = self.embed_and_store(job).await;
        match &result {
            Ok(EmbedOutcome::Stored) => info!("saved document embedding"),
            Ok(EmbedOutcome::Skipped) => {
                info!("document deleted or rewritten before embedding finished; skipped")
            }
            Err(err) => warn!(error = %err, "failed to embed document"),
        }
        result
    }

    async fn embed_and_store(&self, job: &EmbeddingJob) -> Result<EmbedOutcome, EmbedError> {
        let (title, url, body) = futures::try_join!(
            self.embed_field(job, Field::Title),
            self.embed_field(job, Field::Url),
            self.embed_field(job, Field::Body),
        )?;

        let weights: Vec<f32> = FIELD_WEIGHTS.iter().map(|(_, w)| *w).collect();
        let combined = vector::combine(&[&title, &url, &body], &weights)?;
        let normalized = vector::normalize(&combined)?;

        let applied = self
            .store
            .set_embedding(job.document_id, job.revision, &normalized)
            .await
            .map_err(EmbedError::Store)?;

        Ok(if applied {
            EmbedOutcome::Stored
        } else {
            EmbedOutcome::Skipped
        })
    }

    async fn embed_field(&self, job: &EmbeddingJob, field: Field) -> Result<Vec<f32>, EmbedError> {
        let text = job.field(field);
        debug!(%field, chars = text.len(), "embedding field");
        self.client
            .embed_text(text)
            .await
            .map_err(|source| EmbedError::Field { field, source })
    }
}
