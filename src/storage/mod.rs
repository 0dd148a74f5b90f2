//! Storage layer abstraction and implementations.
//!
//! This module defines the interface for the liked-paper store: the durable
//! set of papers the user explicitly saved. Those papers form the positive
//! class every time the preference model is trained.

pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for liked-paper storage backends.
///
/// Writes have upsert semantics keyed by paper id; nothing is ever deleted
/// automatically.
#[async_trait]
pub trait LikedPaperStore: Send + Sync {
    /// Initialize the storage (create tables, indexes, etc.).
    ///
    /// This should be idempotent and safe to call multiple times.
    ///
    /// # Errors
    /// Returns `StorageError` if initialization fails
    async fn initialize(&self) -> StorageResult<()>;

    /// Retrieve every liked paper.
    ///
    /// # Errors
    /// Returns `StorageError` if retrieval fails
    async fn list_all(&self) -> StorageResult<Vec<Paper>>;

    /// Insert a paper, replacing any existing record with the same id.
    ///
    /// # Errors
    /// Returns `StorageError` if the write fails
    async fn upsert(&self, paper: &Paper) -> StorageResult<()>;

    /// Number of liked papers.
    async fn count(&self) -> StorageResult<usize>;

    /// Snapshot of all liked ids, used to drop already-liked candidates.
    ///
    /// The default implementation derives the set from `list_all`.
    async fn liked_ids(&self) -> StorageResult<HashSet<String>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .map(|paper| paper.id)
            .collect())
    }

    /// Check whether a paper id is already liked.
    async fn contains_id(&self, id: &str) -> StorageResult<bool> {
        Ok(self.liked_ids().await?.contains(id))
    }
}
