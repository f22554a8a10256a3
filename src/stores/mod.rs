//! Vector store backends for embedded chunks.
//!
//! The [`ChunkStore`] trait abstracts the persistence seam so the pipeline
//! can run against Postgres + pgvector in production and an in-memory
//! double in tests. The store is insert-only: re-ingesting a document adds
//! a fresh set of rows, and nothing is ever updated or deduplicated.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::PipelineError;

pub use memory::MemoryChunkStore;
pub use postgres::PgChunkStore;

/// A fragment ready for insertion: content plus its embedding.
#[derive(Clone, Debug)]
pub struct NewChunk {
    pub document_id: String,
    /// Position in the filtered fragment sequence, not a byte offset.
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A stored chunk row as returned from the store (embedding omitted).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRow {
    pub id: i64,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A search hit paired with its distance to the query vector.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: ChunkRow,
    pub distance: f32,
}

/// Insert-one / nearest-neighbor interface over a vector-capable store.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Writes one chunk as a new row and returns the stored row.
    async fn insert_chunk(&self, chunk: NewChunk) -> Result<ChunkRow, PipelineError>;

    /// Returns up to `top_k` chunks ordered by ascending vector distance.
    async fn search(&self, embedding: &[f32], top_k: usize)
    -> Result<Vec<ScoredChunk>, PipelineError>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<usize, PipelineError>;
}
