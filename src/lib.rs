//! # Lucentsave
//!
//! A read-later service: save web articles, then find them again by
//! keyword or by meaning.
//!
//! This crate is the native application around [`lucentsave_core`]. It
//! supplies the SQLite store, the OpenAI embedding provider, the article
//! extractor, password hashing, the background embedding queue and the
//! HTTP server, plus the `lsv` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌──────────────────┐
//! │   HTTP   │──▶│   Lucentsave   │──▶│      SQLite      │
//! │  (axum)  │   │    service     │   │   FTS5 + BLOB    │
//! └──────────┘   └───────┬────────┘   └────────▲─────────┘
//!                        │ submit              │ set_embedding
//!                        ▼                     │
//!                ┌────────────────┐   ┌────────┴─────────┐
//!                │ EmbeddingQueue │──▶│ DocumentEmbedder │
//!                └────────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export LUCENTSAVE_TOKEN_SECRET=$(openssl rand -hex 32)
//! lsv init                      # create database
//! lsv serve                     # start HTTP server
//! lsv embed pending             # backfill missing embeddings
//! lsv rescrape                  # re-extract empty documents
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`Store`](lucentsave_core::store::Store) |
//! | [`embedding`] | OpenAI and disabled embedding providers |
//! | [`extract`] | Article extraction and link previews |
//! | [`password`] | Password hashing |
//! | [`queue`] | Bounded background embedding queue |
//! | [`service`] | Per-action orchestration |
//! | [`auth`] | Session cookies and middleware |
//! | [`server`] | HTTP server |
//! | [`embed_cmd`] | Embedding backfill |
//! | [`rescrape`] | Re-extraction of empty documents |
//! | [`logging`] | Tracing subscriber setup |

pub mod auth;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod logging;
pub mod migrate;
pub mod password;
pub mod queue;
pub mod rescrape;
pub mod server;
pub mod service;
pub mod sqlite_store;
