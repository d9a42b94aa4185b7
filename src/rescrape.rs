//! `lsv rescrape`: re-extract documents whose body is empty.
//!
//! Each document goes back through the article extractor. When extraction
//! fails the title falls back to the host name and the body to
//! [`PLACEHOLDER_BODY`], so the row is no longer picked up on the next run.
//! Every rewritten document is re-embedded before moving on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use lucentsave_core::embedder::DocumentEmbedder;
use lucentsave_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::extract::{domain_from_url, ArticleExtractor, HttpArticleExtractor};
use crate::sqlite_store::SqliteStore;

pub const PLACEHOLDER_BODY: &str = "<p>The content of this page could not be retrieved. \
The original URL is kept above; visit it to read the article.</p>";

/// Pause between documents, to go easy on the extractor and the provider.
pub const PAUSE: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RescrapeReport {
    pub found: usize,
    pub extracted: usize,
    pub placeholder: usize,
}

pub async fn run_rescrape(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let extractor = HttpArticleExtractor::new(&config.extractor)?;

    let embedder = if config.embedding.is_enabled() {
        let provider = embedding::create_provider(&config.embedding)?;
        let client = embedding::create_client(&config.embedding, provider);
        Some(DocumentEmbedder::new(client, store.clone()))
    } else {
        println!("  embeddings disabled; documents will be left for `lsv embed pending`");
        None
    };

    let report = rescrape(store.as_ref(), &extractor, embedder.as_ref(), PAUSE).await?;

    println!("rescrape");
    println!("  documents with empty body: {}", report.found);
    println!("  extracted: {}", report.extracted);
    println!("  used placeholder: {}", report.placeholder);

    pool.close().await;
    Ok(())
}

/// Re-extract every empty document in `store`, sleeping `pause` between them.
pub async fn rescrape(
    store: &dyn Store,
    extractor: &dyn ArticleExtractor,
    embedder: Option<&DocumentEmbedder>,
    pause: Duration,
) -> Result<RescrapeReport> {
    let documents = store.documents_with_empty_body().await?;
    let mut report = RescrapeReport {
        found: documents.len(),
        ..Default::default()
    };
    info!(count = report.found, "rescraping documents with empty body");

    for (i, (id, url)) in documents.iter().enumerate() {
        info!(document_id = id, url = %url, "[{}/{}] rescraping", i + 1, report.found);

        let (title, body) = match extractor.extract(url).await {
            Ok(article) => {
                report.extracted += 1;
                let title = if article.title.trim().is_empty() {
                    domain_from_url(url)
                } else {
                    article.title
                };
                (title, article.content)
            }
            Err(e) => {
                warn!(document_id = id, error = %e, "extraction failed; using placeholder");
                report.placeholder += 1;
                (domain_from_url(url), PLACEHOLDER_BODY.to_string())
            }
        };

        let document = match store.replace_content(*id, &title, &body).await {
            Ok(Some(document)) => document,
            Ok(None) => continue,
            Err(e) => {
                let detail = format!("{:#}", e);
                warn!(document_id = id, error = %detail, "failed to update document");
                continue;
            }
        };

        if let Some(embedder) = embedder {
            // failures are logged by the embedder; backfill retries them
            let _ = embedder.embed_document(&document.embedding_job()).await;
        }

        if i + 1 < documents.len() {
            tokio::time::sleep(pause).await;
        }
    }

    info!(
        extracted = report.extracted,
        placeholder = report.placeholder,
        "rescrape finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Article;
    use async_trait::async_trait;
    use lucentsave_core::embedding::{EmbeddingClient, EmbeddingProvider};
    use lucentsave_core::models::NewDocument;
    use lucentsave_core::store::memory::InMemoryStore;
    use lucentsave_core::ProviderError;

    /// Succeeds for URLs containing "ok", with an empty title for "notitle".
    struct ScriptedExtractor;

    #[async_trait]
    impl ArticleExtractor for ScriptedExtractor {
        async fn extract(&self, url: &str) -> std::result::Result<Article, ProviderError> {
            if !url.contains("ok") {
                return Err(ProviderError::Timeout);
            }
            let title = if url.contains("notitle") { "" } else { "Fetched" };
            Ok(Article {
                title: title.to_string(),
                content: "<p>restored</p>".to_string(),
            })
        }
    }

    struct UnitProvider;

    #[async_trait]
    impl EmbeddingProvider for UnitProvider {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            Ok(vec![0.0, 1.0])
        }
    }

    async fn save(store: &InMemoryStore, url: &str, body: &str) -> i64 {
        store
            .save_document(&NewDocument {
                owner_id: 1,
                url: url.to_string(),
                title: "old".to_string(),
                body: body.to_string(),
                created_at: 0,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_rescrape_restores_or_falls_back() {
        let store = Arc::new(InMemoryStore::new());
        let ok = save(&store, "https://ok.example.com/a", "").await;
        let bare = save(&store, "https://ok.notitle.example.com/b", "").await;
        let broken = save(&store, "https://down.example.com/c", "").await;
        let untouched = save(&store, "https://ok.example.com/d", "<p>kept</p>").await;

        let report = rescrape(store.as_ref(), &ScriptedExtractor, None, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(
            report,
            RescrapeReport {
                found: 3,
                extracted: 2,
                placeholder: 1,
            }
        );

        let doc = store.get_document(ok, 1).await.unwrap().unwrap();
        assert_eq!((doc.title.as_str(), doc.body.as_str()), ("Fetched", "<p>restored</p>"));
        assert_eq!(doc.revision, 2);

        let doc = store.get_document(bare, 1).await.unwrap().unwrap();
        assert_eq!(doc.title, "ok.notitle.example.com");

        let doc = store.get_document(broken, 1).await.unwrap().unwrap();
        assert_eq!(doc.title, "down.example.com");
        assert_eq!(doc.body, PLACEHOLDER_BODY);

        let doc = store.get_document(untouched, 1).await.unwrap().unwrap();
        assert_eq!(doc.revision, 1);
    }

    #[tokio::test]
    async fn test_rescrape_reembeds_rewritten_documents() {
        let store = Arc::new(InMemoryStore::new());
        let id = save(&store, "https://ok.example.com/a", "").await;
        let embedder = DocumentEmbedder::new(
            EmbeddingClient::new(Arc::new(UnitProvider), 100),
            store.clone(),
        );

        rescrape(store.as_ref(), &ScriptedExtractor, Some(&embedder), Duration::ZERO)
            .await
            .unwrap();
        let doc = store.get_document(id, 1).await.unwrap().unwrap();
        assert!(doc.embedding.is_some());
        assert!(store.documents_with_empty_body().await.unwrap().is_empty());
    }
}
