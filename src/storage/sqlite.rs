//! SQLite storage implementation.
//!
//! This module provides a SQLite-backed implementation of the
//! `NearestNeighborStore` trait. It uses rusqlite for database access and stores
//! embeddings as vector literals (`[x,y,...]`) in a nullable TEXT column.
//!
//! Every call opens its own connection, so concurrent requests never share a
//! connection handle.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, Row};
use tracing::debug;

use super::{
    format_vector_literal, parse_vector_literal, DistanceMetric, NearestNeighborStore,
    StorageError, StorageResult,
};
use crate::models::{Paper, ResultItem};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS papers (
        id               INTEGER PRIMARY KEY,
        arxiv_id         TEXT,
        title            TEXT NOT NULL,
        abstract         TEXT,
        categories       TEXT,
        update_date      TEXT,
        doi              TEXT,
        authors          TEXT,
        comments         TEXT,
        journal_ref      TEXT,
        citation_count   INTEGER,
        embedding_vector TEXT
    );
    CREATE TABLE IF NOT EXISTS paper_communities (
        paper_id     INTEGER PRIMARY KEY REFERENCES papers(id),
        community_id TEXT NOT NULL
    );
";

const CANDIDATES_SQL: &str = "
    SELECT p.id, p.arxiv_id, p.title, p.abstract, p.categories, p.update_date,
           p.doi, p.authors, p.comments, p.journal_ref, p.citation_count,
           p.embedding_vector, pc.community_id
    FROM papers p
    LEFT JOIN paper_communities pc ON p.id = pc.paper_id
    WHERE p.embedding_vector IS NOT NULL
    ORDER BY p.id ASC
";

/// SQLite-based paper catalog.
///
/// # Schema
/// - `papers`: paper metadata plus `embedding_vector`, a nullable vector literal
/// - `paper_communities`: at most one community label per paper
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Path to the SQLite database file
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open an existing catalog.
    ///
    /// # Errors
    /// Returns `StorageError::ConnectionError` if the file does not exist or
    /// cannot be opened.
    pub fn open(db_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self { db_path: db_path.into() };
        if !store.db_path.exists() {
            return Err(StorageError::ConnectionError(format!(
                "Database file not found: {}",
                store.db_path.display()
            )));
        }
        store.connect_read_only()?;
        Ok(store)
    }

    /// Create (or reuse) a catalog file and make sure the schema exists.
    pub fn create(db_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self { db_path: db_path.into() };
        store.initialize()?;
        Ok(store)
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Create tables if they do not exist. Idempotent.
    pub fn initialize(&self) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::SchemaError(e.to_string()))
    }

    /// Insert or replace a paper. `embedding` of `None` stores a NULL vector,
    /// which keeps the paper out of search results.
    pub fn insert_paper(&self, paper: &Paper, embedding: Option<&[f32]>) -> StorageResult<()> {
        let conn = self.connect()?;
        let literal = embedding.map(format_vector_literal).transpose()?;
        conn.execute(
            "INSERT OR REPLACE INTO papers (
                 id, arxiv_id, title, abstract, categories, update_date, doi,
                 authors, comments, journal_ref, citation_count, embedding_vector
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                paper.id,
                paper.arxiv_id,
                paper.title,
                paper.abstract_text,
                paper.categories,
                paper.update_date,
                paper.doi,
                paper.authors,
                paper.comments,
                paper.journal_ref,
                paper.citation_count,
                literal,
            ],
        )
        .map_err(|e| StorageError::QueryError(e.to_string()))?;
        Ok(())
    }

    /// Attach a community label to a paper, replacing any previous one.
    pub fn assign_community(&self, paper_id: i64, community_id: &str) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO paper_communities (paper_id, community_id) VALUES (?1, ?2)",
            params![paper_id, community_id],
        )
        .map_err(|e| StorageError::QueryError(e.to_string()))?;
        Ok(())
    }

    /// Number of papers that carry an embedding and are therefore searchable.
    pub fn count_papers(&self) -> StorageResult<usize> {
        let conn = self.connect_read_only()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM papers WHERE embedding_vector IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        Ok(count as usize)
    }

    fn connect(&self) -> StorageResult<Connection> {
        Connection::open(&self.db_path).map_err(|e| StorageError::ConnectionError(e.to_string()))
    }

    fn connect_read_only(&self) -> StorageResult<Connection> {
        Connection::open_with_flags(&self.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| StorageError::ConnectionError(e.to_string()))
    }

    /// Blocking scan behind `nearest_neighbors`.
    fn scan(&self, query: &[f32], limit: usize, metric: DistanceMetric) -> StorageResult<Vec<ResultItem>> {
        let conn = self.connect_read_only()?;
        let mut stmt = conn
            .prepare(CANDIDATES_SQL)
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        let rows = stmt
            .query_map([], read_candidate)
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let mut scored = Vec::new();
        for row in rows {
            let (paper, literal, community_id) =
                row.map_err(|e| StorageError::QueryError(e.to_string()))?;
            let embedding = parse_vector_literal(&literal)
                .map_err(|reason| StorageError::MalformedVector { id: paper.id, reason })?;
            if embedding.len() != query.len() {
                return Err(StorageError::MalformedVector {
                    id: paper.id,
                    reason: format!(
                        "dimension {} does not match query dimension {}",
                        embedding.len(),
                        query.len()
                    ),
                });
            }

            let distance = metric.distance(query, &embedding);
            scored.push(ResultItem { paper, distance, community_id, embedding });
        }

        // Rows arrive ordered by id and the sort is stable, so ties keep id order.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);

        debug!(candidates = scored.len(), "Nearest neighbors retrieved");
        Ok(scored)
    }
}

fn read_candidate(row: &Row<'_>) -> rusqlite::Result<(Paper, String, Option<String>)> {
    let paper = Paper {
        id: row.get(0)?,
        arxiv_id: row.get(1)?,
        title: row.get(2)?,
        abstract_text: row.get(3)?,
        categories: row.get(4)?,
        update_date: row.get(5)?,
        doi: row.get(6)?,
        authors: row.get(7)?,
        comments: row.get(8)?,
        journal_ref: row.get(9)?,
        citation_count: row.get(10)?,
    };
    Ok((paper, row.get(11)?, row.get(12)?))
}

#[async_trait]
impl NearestNeighborStore for SqliteStore {
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        limit: usize,
        metric: DistanceMetric,
    ) -> StorageResult<Vec<ResultItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let store = self.clone();
        let query = query.to_vec();
        tokio::task::spawn_blocking(move || store.scan(&query, limit, metric))
            .await
            .map_err(|e| StorageError::QueryError(format!("Store task failed: {}", e)))?
    }
}
