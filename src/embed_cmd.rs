use std::sync::Arc;

use anyhow::{bail, Result};

use lucentsave_core::embedder::{DocumentEmbedder, EmbedOutcome};
use lucentsave_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Counts reported by a backfill run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub pending: usize,
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Embed documents whose embedding is NULL, one at a time.
pub async fn run_embed_pending(config: &Config, limit: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let client = embedding::create_client(&config.embedding, provider);
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let embedder = DocumentEmbedder::new(client, store.clone());

    let report = backfill(store.as_ref(), &embedder, limit.unwrap_or(usize::MAX)).await?;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all documents up to date");
    } else {
        println!("  total pending: {}", report.pending);
        println!("  embedded: {}", report.embedded);
        println!("  skipped: {}", report.skipped);
        println!("  failed: {}", report.failed);
    }

    pool.close().await;
    Ok(())
}

/// Embed up to `limit` pending documents sequentially.
///
/// Failures are counted and logged by the embedder; they never abort the run.
pub async fn backfill(
    store: &dyn Store,
    embedder: &DocumentEmbedder,
    limit: usize,
) -> Result<BackfillReport> {
    let pending = store.pending_embeddings(limit).await?;
    let mut report = BackfillReport {
        pending: pending.len(),
        ..Default::default()
    };

    for job in &pending {
        match embedder.embed_document(job).await {
            Ok(EmbedOutcome::Stored) => report.embedded += 1,
            Ok(EmbedOutcome::Skipped) => report.skipped += 1,
            Err(_) => report.failed += 1,
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lucentsave_core::embedding::{EmbeddingClient, EmbeddingProvider};
    use lucentsave_core::models::NewDocument;
    use lucentsave_core::store::memory::InMemoryStore;
    use lucentsave_core::ProviderError;

    /// Fails for any text containing "boom".
    struct PickyProvider;

    #[async_trait]
    impl EmbeddingProvider for PickyProvider {
        fn model_name(&self) -> &str {
            "picky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            if text.contains("boom") {
                Err(ProviderError::Request("boom".to_string()))
            } else {
                Ok(vec![1.0, 1.0])
            }
        }
    }

    async fn save(store: &InMemoryStore, body: &str, created_at: i64) {
        store
            .save_document(&NewDocument {
                owner_id: 1,
                url: "https://example.com".to_string(),
                title: "t".to_string(),
                body: body.to_string(),
                created_at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_backfill_counts_and_continues_after_failure() {
        let store = Arc::new(InMemoryStore::new());
        save(&store, "fine", 1).await;
        save(&store, "boom", 2).await;
        save(&store, "also fine", 3).await;

        let client = EmbeddingClient::new(Arc::new(PickyProvider), 100);
        let embedder = DocumentEmbedder::new(client, store.clone());
        let report = backfill(store.as_ref(), &embedder, 10).await.unwrap();

        assert_eq!(
            report,
            BackfillReport {
                pending: 3,
                embedded: 2,
                skipped: 0,
                failed: 1,
            }
        );
        // the failed one stays pending for the next run
        assert_eq!(store.pending_embeddings(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backfill_respects_limit() {
        let store = Arc::new(InMemoryStore::new());
        for n in 0..5 {
            save(&store, "fine", n).await;
        }
        let client = EmbeddingClient::new(Arc::new(PickyProvider), 100);
        let embedder = DocumentEmbedder::new(client, store.clone());

        let report = backfill(store.as_ref(), &embedder, 2).await.unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(store.pending_embeddings(10).await.unwrap().len(), 3);
    }
}
