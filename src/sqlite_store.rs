//! SQLite-backed [`Store`] implementation.
//!
//! Documents live in `documents`; `documents_fts` mirrors title and body
//! for keyword search and is written in the same transaction as the row it
//! indexes. Embeddings are little-endian f32 BLOBs on the document row and
//! are ranked in Rust, since a single owner's library fits in memory. A
//! row is pending while `embedded_revision` differs from `revision`; the
//! previous vector keeps serving search until then.

use std::cmp::Ordering;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use lucentsave_core::models::{
    Document, DocumentId, DocumentStatus, DocumentSummary, EmbeddingJob, NewDocument, UserId,
    UserRecord,
};
use lucentsave_core::store::{EmailTaken, Store};
use lucentsave_core::vector::{blob_to_vec, inner_product, vec_to_blob};

const DOCUMENT_COLUMNS: &str =
    "id, owner_id, url, title, body, is_read, is_liked, created_at, revision, embedding, \
     embedded_revision";
const SUMMARY_COLUMNS: &str = "id, url, title, is_read, is_liked, created_at";

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }
}

fn row_to_document(row: &SqliteRow) -> Document {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Document {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        url: row.get("url"),
        title: row.get("title"),
        body: row.get("body"),
        is_read: row.get("is_read"),
        is_liked: row.get("is_liked"),
        created_at: row.get("created_at"),
        revision: row.get("revision"),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        embedded_revision: row.get("embedded_revision"),
    }
}

fn row_to_summary(row: &SqliteRow) -> DocumentSummary {
    DocumentSummary {
        id: row.get("id"),
        url: row.get("url"),
        title: row.get("title"),
        is_read: row.get("is_read"),
        is_liked: row.get("is_liked"),
        created_at: row.get("created_at"),
    }
}

/// Turn free text into an FTS5 query of quoted terms (implicit AND), so
/// operators and column filters in user input are matched literally.
pub fn fts_query(text: &str) -> String {
    text.split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_document(&self, doc: &NewDocument) -> Result<Document> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO documents (owner_id, url, title, body, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.owner_id)
        .bind(&doc.url)
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(doc.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert document")?
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO documents_fts (document_id, owner_id, title, body) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(doc.owner_id)
        .bind(&doc.title)
        .bind(&doc.body)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Document {
            id,
            owner_id: doc.owner_id,
            url: doc.url.clone(),
            title: doc.title.clone(),
            body: doc.body.clone(),
            is_read: false,
            is_liked: false,
            created_at: doc.created_at,
            revision: 1,
            embedding: None,
            embedded_revision: None,
        })
    }

    async fn get_document(&self, id: DocumentId, owner_id: UserId) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ? AND owner_id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn list_documents(&self, owner_id: UserId, read: bool) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM documents
            WHERE owner_id = ? AND is_read = ?
            ORDER BY created_at DESC, id DESC
            "#,
            SUMMARY_COLUMNS
        ))
        .bind(owner_id)
        .bind(read)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_summary).collect())
    }

    async fn update_status(
        &self,
        id: DocumentId,
        owner_id: UserId,
        status: DocumentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET is_read = ?, is_liked = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(status.is_read)
        .bind(status.is_liked)
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_body(
        &self,
        id: DocumentId,
        owner_id: UserId,
        body: &str,
    ) -> Result<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = ?, revision = revision + 1
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(body)
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("UPDATE documents_fts SET body = ? WHERE document_id = ?")
            .bind(body)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.fetch_document(id).await
    }

    async fn replace_content(
        &self,
        id: DocumentId,
        title: &str,
        body: &str,
    ) -> Result<Option<Document>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET title = ?, body = ?, revision = revision + 1
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(body)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("UPDATE documents_fts SET title = ?, body = ? WHERE document_id = ?")
            .bind(title)
            .bind(body)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.fetch_document(id).await
    }

    async fn delete_document(&self, id: DocumentId, owner_id: UserId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn set_embedding(&self, id: DocumentId, revision: i64, vector: &[f32]) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET embedding = ?, embedded_revision = revision \
             WHERE id = ? AND revision = ?",
        )
        .bind(vec_to_blob(vector))
        .bind(id)
        .bind(revision)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_nearest(
        &self,
        owner_id: UserId,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, embedding FROM documents WHERE owner_id = ? AND embedding IS NOT NULL",
            SUMMARY_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, DocumentSummary)> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = inner_product(vector, &blob_to_vec(&blob))?;
                Some((score, row_to_summary(row)))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        scored.truncate(limit);

        Ok(scored.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn query_keyword(
        &self,
        owner_id: UserId,
        text: &str,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>> {
        let query = fts_query(text);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT d.id, d.url, d.title, d.is_read, d.is_liked, d.created_at
            FROM documents_fts
            JOIN documents d ON d.id = documents_fts.document_id
            WHERE documents_fts MATCH ? AND documents_fts.owner_id = ?
            ORDER BY documents_fts.rank, d.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(&query)
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_summary).collect())
    }

    async fn pending_embeddings(&self, limit: usize) -> Result<Vec<EmbeddingJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, revision, title, url, body FROM documents
            WHERE embedded_revision IS NOT revision
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EmbeddingJob {
                document_id: row.get("id"),
                revision: row.get("revision"),
                title: row.get("title"),
                url: row.get("url"),
                body: row.get("body"),
            })
            .collect())
    }

    async fn documents_with_empty_body(&self) -> Result<Vec<(DocumentId, String)>> {
        let rows = sqlx::query("SELECT id, url FROM documents WHERE body = '' ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| (row.get("id"), row.get("url"))).collect())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT id, email, password_hash FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserRecord {
            id: r.get("id"),
            email: r.get("email"),
            password_hash: r.get("password_hash"),
        }))
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserId> {
        let result = sqlx::query("INSERT INTO users (email, password_hash) VALUES (?, ?)")
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool)
            .await;
        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(EmailTaken.into()),
            Err(e) => Err(e).with_context(|| format!("Failed to create user {}", email)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("rust  async"), r#""rust" "async""#);
        assert_eq!(fts_query(r#"title:x OR "y"#), r#""title:x" "OR" """y""#);
        assert_eq!(fts_query("   "), "");
    }
}
