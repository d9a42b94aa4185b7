//! # Lucentsave Core
//!
//! Runtime-agnostic logic for Lucentsave: data models, vector math, text
//! chunking, the embedding pipeline, similarity search, session tokens and
//! the store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP server or filesystem I/O. The
//! application crate supplies concrete providers and stores and drives the
//! async work on its runtime.
//!
//! ## Pipeline
//!
//! ```text
//! title ─┐
//! url   ─┼─▶ EmbeddingClient (chunk → provider → sum → normalize)
//! body  ─┘            │
//!                     ▼
//!            DocumentEmbedder (0.25 / 0.15 / 0.60 → normalize)
//!                     │
//!                     ▼
//!            Store::set_embedding (revision-checked)
//! ```

pub mod chunk;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod store;
pub mod token;
pub mod vector;

pub use error::{Error, ProviderError, Result};
