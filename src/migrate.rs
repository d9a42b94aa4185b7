use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema on the configured database. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // embedding is NULL until the first vector lands; embedded_revision
    // trails revision while a rewrite is waiting for its new vector
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            url TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            is_read INTEGER NOT NULL DEFAULT 0,
            is_liked INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            revision INTEGER NOT NULL DEFAULT 1,
            embedding BLOB,
            embedded_revision INTEGER,
            FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // databases created before embedded_revision existed
    let has_embedded_revision: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('documents') WHERE name = 'embedded_revision'",
    )
    .fetch_one(pool)
    .await?;
    if !has_embedded_revision {
        sqlx::query("ALTER TABLE documents ADD COLUMN embedded_revision INTEGER")
            .execute(pool)
            .await?;
        sqlx::query(
            "UPDATE documents SET embedded_revision = revision WHERE embedding IS NOT NULL",
        )
        .execute(pool)
        .await?;
    }

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                document_id UNINDEXED,
                owner_id UNINDEXED,
                title,
                body
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_owner_read ON documents(owner_id, is_read, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_stale ON documents(id) \
         WHERE embedded_revision IS NOT revision",
    )
    .execute(pool)
    .await?;

    Ok(())
}
