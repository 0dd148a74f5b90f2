//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `LikedPaperStore`
//! trait. A connection is opened for each operation and dropped when it
//! finishes; there is no pooling. The blocking rusqlite calls run on tokio's
//! blocking thread pool.
//!
//! # Schema
//! ```sql
//! CREATE TABLE saved_papers (
//!     id       TEXT PRIMARY KEY,
//!     title    TEXT NOT NULL,
//!     abstract TEXT,
//!     updated  TEXT,   -- ISO-8601
//!     url      TEXT
//! )
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use super::{LikedPaperStore, StorageError, StorageResult};
use crate::models::Paper;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS saved_papers (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    abstract TEXT,
    updated TEXT,
    url TEXT
)";

/// SQLite-backed liked-paper store.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    /// Path to the SQLite database file
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance.
    ///
    /// No connection is opened until the first operation.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Open a connection, run `op` against it, and close it again.
    async fn with_connection<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(|e| {
                StorageError::ConnectionError(format!("{}: {}", path.display(), e))
            })?;
            op(&conn)
        })
        .await
        .map_err(|e| StorageError::Other(format!("storage task failed: {}", e)))?
    }

    fn row_to_paper(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Paper, Option<String>)> {
        let updated: Option<String> = row.get("updated")?;
        let paper = Paper {
            id: row.get("id")?,
            title: row.get("title")?,
            abstract_text: row.get::<_, Option<String>>("abstract")?.unwrap_or_default(),
            updated: DateTime::<Utc>::default(),
            url: row.get::<_, Option<String>>("url")?.unwrap_or_default(),
        };
        Ok((paper, updated))
    }

    fn parse_updated(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::SerializationError(format!("bad timestamp '{}': {}", raw, e)))
    }
}

fn query_error(e: rusqlite::Error) -> StorageError {
    StorageError::QueryError(e.to_string())
}

#[async_trait]
impl LikedPaperStore for SqliteStorage {
    async fn initialize(&self) -> StorageResult<()> {
        debug!(path = %self.db_path.display(), "Ensuring saved_papers table exists");
        self.with_connection(|conn| {
            conn.execute(CREATE_TABLE_SQL, [])
                .map_err(|e| StorageError::SchemaError(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list_all(&self) -> StorageResult<Vec<Paper>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, title, abstract, updated, url FROM saved_papers ORDER BY id")
                .map_err(query_error)?;
            let rows = stmt
                .query_map([], Self::row_to_paper)
                .map_err(query_error)?;

            let mut papers = Vec::new();
            for row in rows {
                let (mut paper, updated) = row.map_err(query_error)?;
                if let Some(raw) = updated.as_deref() {
                    paper.updated = Self::parse_updated(raw)?;
                }
                papers.push(paper);
            }
            Ok(papers)
        })
        .await
    }

    async fn upsert(&self, paper: &Paper) -> StorageResult<()> {
        let paper = paper.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO saved_papers (id, title, abstract, updated, url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    paper.id,
                    paper.title,
                    paper.abstract_text,
                    paper.updated.to_rfc3339(),
                    paper.url,
                ],
            )
            .map_err(query_error)?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> StorageResult<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM saved_papers", [], |row| row.get(0))
                .map_err(query_error)?;
            usize::try_from(count).map_err(|e| StorageError::Other(e.to_string()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn create_test_storage() -> (TempDir, SqliteStorage) {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(dir.path().join("papers.db"));
        storage.initialize().await.unwrap();
        (dir, storage)
    }

    fn create_test_paper(id: &str, title: &str) -> Paper {
        Paper {
            id: format!("http://arxiv.org/abs/{}", id),
            title: title.to_string(),
            abstract_text: format!("Abstract of {}", title),
            updated: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            url: format!("http://arxiv.org/pdf/{}", id),
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (_dir, storage) = create_test_storage().await;
        storage.initialize().await.unwrap();
        assert_eq!(storage.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_and_list_round_trip() {
        let (_dir, storage) = create_test_storage().await;
        let paper = create_test_paper("2403.00001v1", "Sparse Attention");

        storage.upsert(&paper).await.unwrap();

        let papers = storage.list_all().await.unwrap();
        assert_eq!(papers, vec![paper]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_record() {
        let (_dir, storage) = create_test_storage().await;
        let original = create_test_paper("2403.00001v1", "Old Title");
        let mut revised = original.clone();
        revised.title = "New Title".to_string();
        revised.updated = Utc.with_ymd_and_hms(2024, 4, 2, 8, 30, 0).unwrap();

        storage.upsert(&original).await.unwrap();
        storage.upsert(&revised).await.unwrap();

        assert_eq!(storage.count().await.unwrap(), 1);
        let papers = storage.list_all().await.unwrap();
        assert_eq!(papers[0].title, "New Title");
        assert_eq!(papers[0].updated, revised.updated);
    }

    #[tokio::test]
    async fn test_liked_ids_and_contains_id() {
        let (_dir, storage) = create_test_storage().await;
        let paper = create_test_paper("2403.00002v2", "Diffusion Models");
        storage.upsert(&paper).await.unwrap();

        let ids = storage.liked_ids().await.unwrap();
        assert!(ids.contains(&paper.id));
        assert!(storage.contains_id(&paper.id).await.unwrap());
        assert!(!storage.contains_id("http://arxiv.org/abs/0000.00000v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reads_rows_with_null_columns() {
        let (dir, storage) = create_test_storage().await;
        let conn = Connection::open(dir.path().join("papers.db")).unwrap();
        conn.execute(
            "INSERT INTO saved_papers (id, title) VALUES ('legacy', 'Legacy Row')",
            [],
        )
        .unwrap();
        drop(conn);

        let papers = storage.list_all().await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].abstract_text, "");
        assert_eq!(papers[0].updated, DateTime::<Utc>::default());
    }

    #[tokio::test]
    async fn test_reads_python_isoformat_timestamps() {
        let (dir, storage) = create_test_storage().await;
        let conn = Connection::open(dir.path().join("papers.db")).unwrap();
        conn.execute(
            "INSERT INTO saved_papers (id, title, abstract, updated, url)
             VALUES ('p', 'T', 'A', '2016-06-10T15:30:00+00:00', 'u')",
            [],
        )
        .unwrap();
        drop(conn);

        let papers = storage.list_all().await.unwrap();
        assert_eq!(
            papers[0].updated,
            Utc.with_ymd_and_hms(2016, 6, 10, 15, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_connection_error() {
        let storage = SqliteStorage::new("/nonexistent/dir/papers.db");
        assert!(matches!(
            storage.initialize().await,
            Err(StorageError::ConnectionError(_))
        ));
    }
}
