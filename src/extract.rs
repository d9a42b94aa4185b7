//! Article extraction and link previews.
//!
//! Readable content is produced by an external extraction service (a
//! readability process listening on `[extractor] url`). It accepts
//! `POST {"url": ...}` and answers `{"title": ..., "content": ...}`, where
//! `content` is sanitized HTML.
//!
//! Link previews fetch a page directly with a short timeout and return its
//! raw body, cut off at `[extractor] preview_max_bytes`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use lucentsave_core::ProviderError;

use crate::config::ExtractorConfig;

/// Extracted readable content of a web page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Turns a URL into readable content.
#[async_trait]
pub trait ArticleExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Article, ProviderError>;
}

/// [`ArticleExtractor`] backed by the HTTP extraction service.
pub struct HttpArticleExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpArticleExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.url.clone(),
        })
    }
}

#[async_trait]
impl ArticleExtractor for HttpArticleExtractor {
    async fn extract(&self, url: &str) -> Result<Article, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Article>().await.map_err(http_error)
    }
}

/// Server-side page fetch for link previews.
pub struct PreviewFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl PreviewFetcher {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.preview_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_bytes: config.preview_max_bytes,
        })
    }

    /// Fetch `url` and return at most `max_bytes` of its body as text.
    pub async fn fetch(&self, url: &Url) -> Result<String, ProviderError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(http_error)? {
            let room = self.max_bytes - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                debug!(url = %url, max_bytes = self.max_bytes, "preview body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn http_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::Request(err.to_string())
    }
}

/// Parse `raw` as an absolute http(s) URL with a host.
pub fn parse_absolute_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    (web && url.host_str().is_some_and(|h| !h.is_empty())).then_some(url)
}

/// Host name of `raw`, or `raw` itself when it has none.
pub fn domain_from_url(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_from_url() {
        assert_eq!(
            domain_from_url("https://blog.example.com/post/1?x=y"),
            "blog.example.com"
        );
        assert_eq!(domain_from_url("not a url"), "not a url");
    }

    #[test]
    fn test_parse_absolute_url() {
        assert!(parse_absolute_url("https://example.com/a").is_some());
        assert!(parse_absolute_url("http://localhost:3000").is_some());
        assert!(parse_absolute_url("example.com").is_none());
        assert!(parse_absolute_url("mailto:a@b.c").is_none());
        assert!(parse_absolute_url("").is_none());
    }

    #[test]
    fn test_article_missing_fields_default_empty() {
        let article: Article = serde_json::from_str(r#"{"content":"<p>x</p>"}"#).unwrap();
        assert_eq!(article.title, "");
        assert_eq!(article.content, "<p>x</p>");
    }

    async fn serve_page(body: String) -> Url {
        use axum::{routing::get, Router};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", get(move || async move { body }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_preview_body_is_capped() {
        let fetcher = PreviewFetcher::new(&ExtractorConfig {
            preview_max_bytes: 1000,
            ..ExtractorConfig::default()
        })
        .unwrap();

        let url = serve_page("x".repeat(100_000)).await;
        assert_eq!(fetcher.fetch(&url).await.unwrap().len(), 1000);

        let url = serve_page("<title>small</title>".to_string()).await;
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<title>small</title>");
    }
}
