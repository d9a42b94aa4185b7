//! Embedding provider trait and the per-field embedding client.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus [`EmbeddingClient`], which turns one arbitrarily long
//! text into one unit-length vector:
//!
//! 1. split the text with [`split_into_chunks`] at the provider's input limit;
//! 2. embed each chunk (sequential by default);
//! 3. sum the chunk vectors, each chunk counting equally;
//! 4. normalize the sum.
//!
//! The first failing chunk abandons the whole text. There is no retry;
//! callers decide whether to try again.
//!
//! Concrete provider implementations (OpenAI, disabled) live in the
//! `lucentsave` app crate.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::chunk::split_into_chunks;
use crate::error::ProviderError;
use crate::vector;

/// Maximum characters per provider call, matching the OpenAI input limit
/// used in production.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 16384;

/// Trait for embedding providers.
///
/// Implementations own their HTTP client and timeout. A provider is
/// constructed once at startup and passed to [`EmbeddingClient::new`], so
/// tests can substitute a fake.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one chunk of text that already fits the provider's input limit.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Chunking, aggregating front end over an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    max_chunk_chars: usize,
    chunk_concurrency: usize,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, max_chunk_chars: usize) -> Self {
        Self {
            provider,
            max_chunk_chars,
            chunk_concurrency: 1,
        }
    }

    /// Allow up to `n` chunk requests in flight for a single text.
    ///
    /// Summation is order-independent, so this only changes how hard the
    /// provider is hit. `1` keeps calls strictly sequential.
    pub fn with_chunk_concurrency(mut self, n: usize) -> Self {
        self.chunk_concurrency = n.max(1);
        self
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    /// Embed `text` into a single normalized vector.
    ///
    /// Empty text yields a zero vector of the provider's dimension without a
    /// provider call; the caller's final normalization rejects the result
    /// only if every combined input was empty.
    ///
    /// # Errors
    ///
    /// - any chunk request fails ([`ProviderError`] from the provider);
    /// - a chunk comes back empty ([`ProviderError::EmptyResponse`]);
    /// - chunk dimensions disagree ([`ProviderError::Dimension`]);
    /// - the summed vector has zero norm ([`ProviderError::Degenerate`]).
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let dims = self.provider.dims();
        let chunks = split_into_chunks(text, self.max_chunk_chars);
        if chunks.is_empty() {
            return Ok(vec![0.0; dims]);
        }

        // Provider futures are lazy, so building them up front does not
        // start any request; `buffered` decides how many run at once.
        let provider = self.provider.as_ref();
        let requests: Vec<_> = chunks.into_iter().map(|chunk| provider.embed(chunk)).collect();
        let mut responses = stream::iter(requests).buffered(self.chunk_concurrency);

        let mut sum = vec![0.0f32; dims];
        while let Some(result) = responses.next().await {
            let chunk_vec = result?;
            if chunk_vec.is_empty() {
                return Err(ProviderError::EmptyResponse);
            }
            vector::add_assign(&mut sum, &chunk_vec)?;
        }

        Ok(vector::normalize(&sum)?)
    }
}
