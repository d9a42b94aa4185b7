//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! Secrets never live in the file: the token signing secret comes from
//! `LUCENTSAVE_TOKEN_SECRET` and the OpenAI key from `OPENAI_API_KEY`.
//!
//! ```toml
//! [db]
//! path = "./data/lsv.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! secure_cookies = true
//!
//! [embedding]
//! provider = "openai"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lucentsave_core::token::MIN_SECRET_LEN;

/// Environment variable holding the session signing secret.
pub const TOKEN_SECRET_ENV: &str = "LUCENTSAVE_TOKEN_SECRET";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Adds `Secure` to session cookies. Enable behind HTTPS.
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            secure_cookies: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// PBKDF2 rounds for new password hashes.
    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl_secs(),
            cookie_name: default_cookie_name(),
            password_iterations: default_password_iterations(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

fn default_token_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}
fn default_cookie_name() -> String {
    "token".to_string()
}
fn default_password_iterations() -> u32 {
    crate::password::DEFAULT_ITERATIONS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
            chunk_concurrency: default_chunk_concurrency(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    lucentsave_core::embedding::DEFAULT_MAX_CHUNK_CHARS
}
fn default_chunk_concurrency() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Cap on `len(url) + len(title) + len(body)` in bytes.
    #[serde(default = "default_max_document_len")]
    pub max_document_len: usize,
    /// How often `serve` re-queues documents whose embedding is missing
    /// or stale.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl PipelineConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_document_len: default_max_document_len(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    256
}
fn default_max_document_len() -> usize {
    200_000
}
fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    lucentsave_core::search::DEFAULT_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    #[serde(default = "default_extractor_url")]
    pub url: String,
    #[serde(default = "default_extractor_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_preview_timeout_secs")]
    pub preview_timeout_secs: u64,
    /// Preview bodies are cut off after this many bytes.
    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            url: default_extractor_url(),
            timeout_secs: default_extractor_timeout_secs(),
            preview_timeout_secs: default_preview_timeout_secs(),
            preview_max_bytes: default_preview_max_bytes(),
        }
    }
}

fn default_extractor_url() -> String {
    "http://localhost:3000/process".to_string()
}
fn default_extractor_timeout_secs() -> u64 {
    30
}
fn default_preview_timeout_secs() -> u64 {
    5
}
fn default_preview_max_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.auth.token_ttl_secs == 0 {
        bail!("auth.token_ttl_secs must be > 0");
    }
    if config.auth.cookie_name.is_empty()
        || !config
            .auth
            .cookie_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("auth.cookie_name must be non-empty and contain only [A-Za-z0-9_-]");
    }
    if config.auth.password_iterations == 0 {
        bail!("auth.password_iterations must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.max_input_chars == 0 {
        bail!("embedding.max_input_chars must be > 0");
    }
    if config.embedding.chunk_concurrency == 0 {
        bail!("embedding.chunk_concurrency must be >= 1");
    }

    if config.pipeline.workers == 0 {
        bail!("pipeline.workers must be >= 1");
    }
    if config.pipeline.queue_capacity == 0 {
        bail!("pipeline.queue_capacity must be >= 1");
    }
    if config.pipeline.sweep_interval_secs == 0 {
        bail!("pipeline.sweep_interval_secs must be > 0");
    }

    if config.extractor.preview_max_bytes == 0 {
        bail!("extractor.preview_max_bytes must be > 0");
    }

    if config.retrieval.limit < 1 {
        bail!("retrieval.limit must be >= 1");
    }

    Ok(())
}

/// Read the session signing secret from the environment.
pub fn token_secret() -> Result<Vec<u8>> {
    let secret = std::env::var(TOKEN_SECRET_ENV)
        .with_context(|| format!("{} environment variable not set", TOKEN_SECRET_ENV))?;
    if secret.len() < MIN_SECRET_LEN {
        bail!(
            "{} must be at least {} bytes",
            TOKEN_SECRET_ENV,
            MIN_SECRET_LEN
        );
    }
    Ok(secret.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/lsv.sqlite\"\n").unwrap();
        assert_eq!(config.auth.token_ttl_secs, 604_800);
        assert_eq!(config.auth.cookie_name, "token");
        assert!(!config.server.secure_cookies);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.embedding.max_input_chars, 16384);
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.max_document_len, 200_000);
        assert_eq!(config.pipeline.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.retrieval.limit, 20);
        assert_eq!(config.extractor.preview_timeout_secs, 5);
        assert_eq!(config.extractor.preview_max_bytes, 1024 * 1024);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[retrieval]\nlimit = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[pipeline]\nworkers = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[pipeline]\nsweep_interval_secs = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nmax_input_chars = 0\n").is_err());
    }

    #[test]
    fn test_bad_cookie_name_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[auth]\ncookie_name = \"a b\"\n").is_err());
    }

    #[test]
    fn test_json_log_format() {
        let config = parse("[db]\npath = \"x\"\n[logging]\nformat = \"json\"\n").unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
