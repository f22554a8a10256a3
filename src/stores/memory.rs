//! In-memory chunk store with brute-force cosine distance.
//!
//! Backs tests and offline runs; mirrors the insert-only semantics of the
//! Postgres store, duplicates included.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::PipelineError;

use super::{ChunkRow, ChunkStore, NewChunk, ScoredChunk};

#[derive(Clone, Debug, Default)]
pub struct MemoryChunkStore {
    rows: Arc<Mutex<Vec<StoredChunk>>>,
}

#[derive(Clone, Debug)]
struct StoredChunk {
    row: ChunkRow,
    embedding: Vec<f32>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored rows in insertion order, for assertions.
    pub async fn rows(&self) -> Vec<ChunkRow> {
        self.rows.lock().await.iter().map(|s| s.row.clone()).collect()
    }

    /// Snapshot of stored embeddings in insertion order, for assertions.
    pub async fn embeddings(&self) -> Vec<Vec<f32>> {
        self.rows
            .lock()
            .await
            .iter()
            .map(|s| s.embedding.clone())
            .collect()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn insert_chunk(&self, chunk: NewChunk) -> Result<ChunkRow, PipelineError> {
        let mut rows = self.rows.lock().await;
        let row = ChunkRow {
            id: rows.len() as i64 + 1,
            document_id: chunk.document_id,
            chunk_index: chunk.chunk_index as i64,
            content: chunk.content,
            created_at: Utc::now(),
        };
        rows.push(StoredChunk {
            row: row.clone(),
            embedding: chunk.embedding,
        });
        Ok(row)
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        let rows = self.rows.lock().await;
        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|stored| ScoredChunk {
                chunk: stored.row.clone(),
                distance: cosine_distance(embedding, &stored.embedding),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, PipelineError> {
        Ok(self.rows.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            document_id: "doc".into(),
            chunk_index: index,
            content: content.into(),
            embedding,
        }
    }

    #[tokio::test]
    async fn insert_returns_the_stored_row() {
        let store = MemoryChunkStore::new();
        let row = store
            .insert_chunk(chunk(3, "hello", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(row.chunk_index, 3);
        assert_eq!(row.content, "hello");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reingest_produces_duplicate_rows() {
        let store = MemoryChunkStore::new();
        store
            .insert_chunk(chunk(0, "same", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert_chunk(chunk(0, "same", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn search_orders_by_ascending_distance() {
        let store = MemoryChunkStore::new();
        store
            .insert_chunk(chunk(0, "far", vec![0.0, 1.0]))
            .await
            .unwrap();
        store
            .insert_chunk(chunk(1, "near", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert_chunk(chunk(2, "middling", vec![1.0, 1.0]))
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.content, "near");
        assert_eq!(hits[1].chunk.content, "middling");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn search_returns_fewer_rows_than_requested_when_store_is_small() {
        let store = MemoryChunkStore::new();
        store
            .insert_chunk(chunk(0, "only", vec![1.0, 0.0]))
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
