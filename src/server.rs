//! HTTP server.
//!
//! Exposes Lucentsave over a small form-driven HTTP API. Page routes sit
//! behind [`require_session`]: without a valid session cookie they redirect
//! to `/signin`, and every authenticated response carries a refreshed
//! cookie.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | – | Health check (returns version) |
//! | `GET`  | `/`, `/signin`, `/register` | – | Redirect to `/saved` when signed in |
//! | `POST` | `/create-user` | – | Register and start a session |
//! | `POST` | `/authenticate` | – | Sign in, redirect to `/saved` |
//! | `POST` | `/signout` | – | Clear the session cookie |
//! | `POST` | `/save` | ✓ | Save `url`, `title`, `content` |
//! | `POST` | `/save-url` | ✓ | Extract `url` and save it |
//! | `GET`  | `/fetch-url?url=` | ✓ | Fetch a page for link previews |
//! | `GET`  | `/saved`, `/read` | ✓ | Unread / read documents |
//! | `GET`  | `/post?id=` | ✓ | Full document |
//! | `GET`  | `/post-status?id=` | ✓ | Read/liked flags |
//! | `POST` | `/update-post-state` | ✓ | Set `read` / `liked` |
//! | `POST` | `/highlight` | ✓ | Replace the body of `id` with `content` |
//! | `POST` | `/delete-post` | ✓ | Delete `id` |
//! | `GET`  | `/query?query=&mode=` | ✓ | `semantic` (default) or `keyword` search |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid id" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `unauthorized` (401), `not_found` (404), `provider_error` (502),
//! `internal` (500).

use axum::{
    extract::{Extension, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

use lucentsave_core::embedder::DocumentEmbedder;
use lucentsave_core::models::{DocumentId, DocumentSummary};
use lucentsave_core::search::SearchResult;
use lucentsave_core::store::Store;
use lucentsave_core::token::TokenService;
use lucentsave_core::{Error, ProviderError};

use crate::auth::{
    redirect_if_signed_in, require_session, with_cookie, CurrentUser, SessionCookies, HOME_PATH,
};
use crate::config::{self, Config};
use crate::db;
use crate::embedding::{create_client, create_provider};
use crate::extract::{parse_absolute_url, HttpArticleExtractor, PreviewFetcher};
use crate::queue::{EmbeddingQueue, QueueDrain, Sweeper};
use crate::service::{Limits, Lucentsave, LucentsaveBuilder};
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Lucentsave>,
    pub cookies: Arc<SessionCookies>,
    pub preview: Arc<PreviewFetcher>,
}

/// Background embedding tasks started by [`build_state`].
pub struct Background {
    drain: QueueDrain,
    sweeper: Sweeper,
}

impl Background {
    /// Stop sweeping, then wait for queued jobs. The router (and with it
    /// every other queue handle) must already be dropped.
    pub async fn shutdown(self) {
        self.sweeper.stop().await;
        self.drain.wait().await;
    }
}

/// Wire the store, providers and embedding queue described by `config`.
///
/// [`Background`] is `None` when embeddings are disabled.
pub async fn build_state(config: &Config) -> anyhow::Result<(AppState, Option<Background>)> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let provider = create_provider(&config.embedding)?;
    let client = create_client(&config.embedding, provider);

    let (queue, background) = if config.embedding.is_enabled() {
        let embedder = DocumentEmbedder::new(client.clone(), store.clone());
        let (queue, drain) = EmbeddingQueue::start(
            embedder,
            config.pipeline.workers,
            config.pipeline.queue_capacity,
        );
        let sweeper = Sweeper::start(
            queue.clone(),
            store.clone(),
            config.pipeline.sweep_interval(),
            config.pipeline.queue_capacity,
        );
        (Some(queue), Some(Background { drain, sweeper }))
    } else {
        (None, None)
    };

    let tokens = TokenService::new(&config::token_secret()?, config.auth.token_ttl())?;

    let app = LucentsaveBuilder {
        store,
        client,
        queue,
        tokens,
        extractor: Arc::new(HttpArticleExtractor::new(&config.extractor)?),
        limits: Limits {
            max_document_len: config.pipeline.max_document_len,
            search_limit: config.retrieval.limit,
            password_iterations: config.auth.password_iterations,
        },
    }
    .build();

    let state = AppState {
        app: Arc::new(app),
        cookies: Arc::new(SessionCookies {
            name: config.auth.cookie_name.clone(),
            secure: config.server.secure_cookies,
        }),
        preview: Arc::new(PreviewFetcher::new(&config.extractor)?),
    };
    Ok((state, background))
}

/// Build the full route table over `state`.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/save", post(handle_save))
        .route("/save-url", post(handle_save_url))
        .route("/fetch-url", get(handle_fetch_url))
        .route("/saved", get(handle_list_unread))
        .route("/read", get(handle_list_read))
        .route("/post", get(handle_get_post))
        .route("/post-status", get(handle_post_status))
        .route("/update-post-state", post(handle_update_post_state))
        .route("/highlight", post(handle_highlight))
        .route("/delete-post", post(handle_delete_post))
        .route("/query", get(handle_query))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(handle_health))
        .route("/", get(redirect_if_signed_in))
        .route("/signin", get(redirect_if_signed_in))
        .route("/register", get(redirect_if_signed_in))
        .route("/create-user", post(handle_create_user))
        .route("/authenticate", post(handle_authenticate))
        .route("/signout", post(handle_signout))
        .merge(protected)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until Ctrl-C, then stops accepting connections and waits for
/// queued embedding jobs to finish before returning.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let (state, background) = build_state(config).await?;
    if background.is_none() {
        info!("embeddings disabled; semantic search unavailable");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Lucentsave listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(background) = background {
        info!("waiting for embedding jobs to finish");
        background.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound => ApiError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: "document not found".to_string(),
            },
            Error::Unauthorized => ApiError {
                status: StatusCode::UNAUTHORIZED,
                code: "unauthorized",
                message: "invalid credentials".to_string(),
            },
            Error::Validation(message) => bad_request(message),
            Error::Provider(ProviderError::Disabled) => ApiError {
                status: StatusCode::BAD_REQUEST,
                code: "embeddings_disabled",
                message: "semantic search requires an embedding provider".to_string(),
            },
            Error::Provider(e) => {
                error!(error = %e, "provider call failed");
                ApiError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "provider_error",
                    message: provider_message(&e).to_string(),
                }
            }
            Error::Store(e) => {
                let detail = format!("{:#}", e);
                error!(error = %detail, "store failure");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

/// Client-facing text for a provider failure. Upstream response bodies
/// are logged only.
fn provider_message(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::Timeout => "upstream request timed out",
        ProviderError::Status { .. } => "upstream service returned an error",
        _ => "upstream request failed",
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: Option<&str>) -> ApiResult<DocumentId> {
    raw.and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| bad_request("invalid id"))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Accounts ============

#[derive(Deserialize)]
struct CredentialsForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct CreatedUser {
    user_id: i64,
}

async fn handle_create_user(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> ApiResult<Response> {
    let issued = state.app.sign_up(&form.email, &form.password).await?;
    let body = (
        StatusCode::CREATED,
        Json(CreatedUser {
            user_id: issued.claims.sub,
        }),
    );
    Ok(with_cookie(body.into_response(), &state.cookies.session(&issued)))
}

async fn handle_authenticate(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> ApiResult<Response> {
    let issued = state.app.sign_in(&form.email, &form.password).await?;
    Ok(with_cookie(
        Redirect::to(HOME_PATH).into_response(),
        &state.cookies.session(&issued),
    ))
}

async fn handle_signout(State(state): State<AppState>) -> Response {
    with_cookie(
        StatusCode::NO_CONTENT.into_response(),
        &state.cookies.cleared(),
    )
}

// ============ Saving ============

#[derive(Deserialize)]
struct SaveForm {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

async fn handle_save(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<SaveForm>,
) -> ApiResult<(StatusCode, Json<DocumentSummary>)> {
    let saved = state
        .app
        .save_document(user, &form.url, &form.title, &form.content)
        .await?;
    Ok((StatusCode::CREATED, Json(saved.document.summary())))
}

#[derive(Deserialize)]
struct UrlForm {
    url: Option<String>,
}

async fn handle_save_url(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<UrlForm>,
) -> ApiResult<(StatusCode, Json<DocumentSummary>)> {
    let url = form
        .url
        .as_deref()
        .and_then(parse_absolute_url)
        .ok_or_else(|| bad_request("url must be an absolute http(s) URL"))?;
    let saved = state.app.save_url(user, url.as_str()).await?;
    Ok((StatusCode::CREATED, Json(saved.document.summary())))
}

async fn handle_fetch_url(
    State(state): State<AppState>,
    Query(params): Query<UrlForm>,
) -> ApiResult<Response> {
    let url = params
        .url
        .as_deref()
        .and_then(parse_absolute_url)
        .ok_or_else(|| bad_request("url must be an absolute http(s) URL"))?;
    let html = state.preview.fetch(&url).await.map_err(|e| {
        info!(url = %url, error = %e, "preview fetch failed");
        bad_request(format!("failed to fetch {}", url))
    })?;
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response())
}

#[derive(Deserialize)]
struct HighlightForm {
    id: Option<String>,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct RevisionResponse {
    id: DocumentId,
    revision: i64,
}

async fn handle_highlight(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<HighlightForm>,
) -> ApiResult<Json<RevisionResponse>> {
    let id = parse_id(form.id.as_deref())?;
    let saved = state.app.save_highlight(user, id, &form.content).await?;
    Ok(Json(RevisionResponse {
        id,
        revision: saved.document.revision,
    }))
}

// ============ Reading ============

async fn handle_list_unread(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<DocumentSummary>>> {
    Ok(Json(state.app.list_documents(user, false).await?))
}

async fn handle_list_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<DocumentSummary>>> {
    Ok(Json(state.app.list_documents(user, true).await?))
}

#[derive(Deserialize)]
struct IdParams {
    id: Option<String>,
}

async fn handle_get_post(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<IdParams>,
) -> ApiResult<Response> {
    let id = parse_id(params.id.as_deref())?;
    let document = state.app.get_document(user, id).await?;
    Ok(Json(document).into_response())
}

async fn handle_post_status(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<IdParams>,
) -> ApiResult<Response> {
    let id = parse_id(params.id.as_deref())?;
    let status = state.app.document_status(user, id).await?;
    Ok(Json(status).into_response())
}

// ============ Status and deletion ============

/// `read` and `liked` are checkboxes: present means true.
#[derive(Deserialize)]
struct PostStateForm {
    id: Option<String>,
    read: Option<String>,
    liked: Option<String>,
}

async fn handle_update_post_state(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<PostStateForm>,
) -> ApiResult<Response> {
    let id = parse_id(form.id.as_deref())?;
    let status = state
        .app
        .update_status(user, id, form.read.is_some(), form.liked.is_some())
        .await?;
    Ok(Json(status).into_response())
}

async fn handle_delete_post(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<IdParams>,
) -> ApiResult<StatusCode> {
    let id = parse_id(form.id.as_deref())?;
    state.app.delete_document(user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ GET /query ============

#[derive(Deserialize)]
struct QueryParams {
    query: Option<String>,
    mode: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    results: Vec<SearchResult>,
}

async fn handle_query(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<QueryResponse>> {
    let query = params
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("query must not be empty"))?;

    let results = match params.mode.as_deref().unwrap_or("semantic") {
        "semantic" => state.app.search(user, &query).await?,
        "keyword" => state.app.search_keyword(user, &query).await?,
        other => {
            return Err(bad_request(format!(
                "unknown mode '{}', expected semantic or keyword",
                other
            )))
        }
    };
    Ok(Json(QueryResponse { results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_body_not_echoed() {
        let err = ApiError::from(Error::Provider(ProviderError::Status {
            status: 401,
            body: "invalid api key sk-123".to_string(),
        }));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "provider_error");
        assert!(!err.message.contains("sk-123"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::from(Error::NotFound).status, StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(Error::Provider(ProviderError::Disabled)).code,
            "embeddings_disabled"
        );
        let err = ApiError::from(Error::Store(anyhow::anyhow!("disk I/O error at /var/db")));
        assert_eq!(err.code, "internal");
        assert!(!err.message.contains("/var/db"));
    }
}
