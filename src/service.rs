//! Request-level orchestration.
//!
//! [`Lucentsave`] owns the store, the embedding queue, the search and token
//! services and the article extractor, and exposes one method per user
//! action. Handlers and CLI commands call these methods and never touch the
//! store directly, so owner scoping and error conversion happen here.
//!
//! Saves persist synchronously and enqueue embedding work; the returned
//! [`Saved::embedding`] handle may be awaited or dropped.

use std::sync::Arc;

use tracing::{info, warn};

use lucentsave_core::embedding::EmbeddingClient;
use lucentsave_core::models::{
    Document, DocumentId, DocumentStatus, DocumentSummary, NewDocument, UserId,
};
use lucentsave_core::search::{SearchResult, SearchService};
use lucentsave_core::store::{EmailTaken, Store};
use lucentsave_core::token::{IssuedToken, TokenService};
use lucentsave_core::{Error, Result};

use crate::extract::{domain_from_url, ArticleExtractor};
use crate::password;
use crate::queue::{EmbeddingQueue, JobHandle};

/// Tunables pulled from config.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_document_len: usize,
    pub search_limit: usize,
    pub password_iterations: u32,
}

/// Result of a save or content rewrite.
#[derive(Debug)]
pub struct Saved {
    pub document: Document,
    /// `None` when embeddings are disabled.
    pub embedding: Option<JobHandle>,
}

/// Application service shared by the HTTP server and the CLI.
pub struct Lucentsave {
    store: Arc<dyn Store>,
    client: EmbeddingClient,
    queue: Option<EmbeddingQueue>,
    search: SearchService,
    tokens: TokenService,
    extractor: Arc<dyn ArticleExtractor>,
    limits: Limits,
}

pub struct LucentsaveBuilder {
    pub store: Arc<dyn Store>,
    pub client: EmbeddingClient,
    /// `None` disables background embedding.
    pub queue: Option<EmbeddingQueue>,
    pub tokens: TokenService,
    pub extractor: Arc<dyn ArticleExtractor>,
    pub limits: Limits,
}

impl LucentsaveBuilder {
    pub fn build(self) -> Lucentsave {
        let search = SearchService::new(self.store.clone(), self.client.dims());
        Lucentsave {
            store: self.store,
            client: self.client,
            queue: self.queue,
            search,
            tokens: self.tokens,
            extractor: self.extractor,
            limits: self.limits,
        }
    }
}

impl Lucentsave {
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    // ============ Documents ============

    /// Persist a document for `owner_id` and enqueue its embedding.
    ///
    /// Rejects documents whose url, title and body together exceed the
    /// configured cap before anything is written.
    pub async fn save_document(
        &self,
        owner_id: UserId,
        url: &str,
        title: &str,
        body: &str,
    ) -> Result<Saved> {
        let new_doc = NewDocument {
            owner_id,
            url: url.trim().to_string(),
            title: title.trim().to_string(),
            body: body.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };
        if new_doc.url.is_empty() {
            return Err(Error::validation("url must not be empty"));
        }
        let len = new_doc.content_len();
        if len > self.limits.max_document_len {
            warn!(owner_id, url = %new_doc.url, len, "document too long");
            return Err(Error::validation(format!(
                "document is {} bytes, limit is {}",
                len, self.limits.max_document_len
            )));
        }

        let document = self.store.save_document(&new_doc).await?;
        info!(owner_id, document_id = document.id, "saved document");
        let embedding = self.enqueue(&document);
        Ok(Saved {
            document,
            embedding,
        })
    }

    /// Extract `url` through the article service, then save it.
    pub async fn save_url(&self, owner_id: UserId, url: &str) -> Result<Saved> {
        let article = self.extractor.extract(url).await?;
        let title = if article.title.trim().is_empty() {
            domain_from_url(url)
        } else {
            article.title
        };
        self.save_document(owner_id, url, &title, &article.content)
            .await
    }

    pub async fn get_document(&self, owner_id: UserId, id: DocumentId) -> Result<Document> {
        self.store
            .get_document(id, owner_id)
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn document_status(
        &self,
        owner_id: UserId,
        id: DocumentId,
    ) -> Result<DocumentStatus> {
        Ok(self.get_document(owner_id, id).await?.status())
    }

    /// Set read/liked flags. `liked` is dropped when `read` is false.
    pub async fn update_status(
        &self,
        owner_id: UserId,
        id: DocumentId,
        read: bool,
        liked: bool,
    ) -> Result<DocumentStatus> {
        let status = DocumentStatus::new(read, liked);
        if self.store.update_status(id, owner_id, status).await? {
            Ok(status)
        } else {
            Err(Error::NotFound)
        }
    }

    pub async fn delete_document(&self, owner_id: UserId, id: DocumentId) -> Result<()> {
        if self.store.delete_document(id, owner_id).await? {
            info!(owner_id, document_id = id, "deleted document");
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    /// Replace the body with its highlighted version and re-embed it.
    pub async fn save_highlight(
        &self,
        owner_id: UserId,
        id: DocumentId,
        body: &str,
    ) -> Result<Saved> {
        let current = self.get_document(owner_id, id).await?;
        let len = current.url.len() + current.title.len() + body.len();
        if len > self.limits.max_document_len {
            return Err(Error::validation(format!(
                "document is {} bytes, limit is {}",
                len, self.limits.max_document_len
            )));
        }
        let document = self
            .store
            .update_body(id, owner_id, body)
            .await?
            .ok_or(Error::NotFound)?;
        let embedding = self.enqueue(&document);
        Ok(Saved {
            document,
            embedding,
        })
    }

    pub async fn list_documents(
        &self,
        owner_id: UserId,
        read: bool,
    ) -> Result<Vec<DocumentSummary>> {
        Ok(self.store.list_documents(owner_id, read).await?)
    }

    fn enqueue(&self, document: &Document) -> Option<JobHandle> {
        self.queue
            .as_ref()
            .map(|queue| queue.submit(document.embedding_job()))
    }

    // ============ Search ============

    /// Embed `query` and rank the owner's documents against it.
    pub async fn search(&self, owner_id: UserId, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        let vector = self.client.embed_text(query).await?;
        self.search
            .search_by_embedding(owner_id, &vector, self.limits.search_limit)
            .await
    }

    pub async fn search_keyword(&self, owner_id: UserId, query: &str) -> Result<Vec<SearchResult>> {
        self.search
            .search_by_keyword(owner_id, query, self.limits.search_limit)
            .await
    }

    // ============ Accounts ============

    /// Create an account and return a session for it.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<IssuedToken> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(Error::validation("password not provided"));
        }
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(Error::validation("email already in use"));
        }

        let password = password.to_string();
        let iterations = self.limits.password_iterations;
        let hash = tokio::task::spawn_blocking(move || {
            password::hash_with_iterations(&password, iterations)
        })
        .await
        .map_err(|e| Error::Store(anyhow::anyhow!("password hashing task failed: {}", e)))??;

        // a concurrent sign-up can claim the email after the lookup above
        let user_id = self
            .store
            .create_user(&email, &hash)
            .await
            .map_err(|err| {
                if err.is::<EmailTaken>() {
                    Error::validation("email already in use")
                } else {
                    Error::Store(err)
                }
            })?;
        info!(user_id, "created account");
        Ok(self.tokens.issue(user_id))
    }

    /// Verify credentials and return a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<IssuedToken> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(Error::Unauthorized);
        }
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(Error::Unauthorized)?;

        let password = password.to_string();
        let stored = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || password::verify_password(&password, &stored))
            .await
            .map_err(|e| Error::Store(anyhow::anyhow!("password check task failed: {}", e)))?;
        if !ok {
            warn!(user_id = user.id, "failed sign-in");
            return Err(Error::Unauthorized);
        }
        Ok(self.tokens.issue(user.id))
    }
}

/// Trim and lowercase `raw`, rejecting anything that is not `local@domain.tld`.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(Error::validation("email not provided"));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(Error::validation("invalid email"))
    }
}
