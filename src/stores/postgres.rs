//! Postgres + pgvector chunk store over sqlx.
//!
//! Schema is bootstrapped on connect (idempotent DDL) so a fresh database
//! is ready without external migration orchestration. Vectors are stored
//! in a fixed-dimension `vector` column indexed for approximate cosine
//! search; a dimension mismatch between ingestion and query is a
//! configuration error that surfaces from the distance operator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::types::PipelineError;

use super::{ChunkRow, ChunkStore, NewChunk, ScoredChunk};

#[derive(Clone, Debug)]
pub struct PgChunkStore {
    pool: PgPool,
}

impl PgChunkStore {
    /// Connects to `database_url` and ensures the chunks table and index
    /// exist with the configured vector `dimension`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, dimension: usize) -> Result<Self, PipelineError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|err| PipelineError::Storage(format!("connect error: {err}")))?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await
            .map_err(|err| PipelineError::Storage(format!("extension setup: {err}")))?;

        // Dimension is part of the column type, so it lands in the DDL text.
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index BIGINT NOT NULL,
                content TEXT NOT NULL,
                embedding vector({dimension}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        );
        sqlx::query(&ddl)
            .execute(&pool)
            .await
            .map_err(|err| PipelineError::Storage(format!("table setup: {err}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS chunks_embedding_idx \
             ON chunks USING hnsw (embedding vector_cosine_ops)",
        )
        .execute(&pool)
        .await
        .map_err(|err| PipelineError::Storage(format!("index setup: {err}")))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_chunk(row: &PgRow) -> ChunkRow {
    ChunkRow {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    #[instrument(skip(self, chunk), fields(document_id = %chunk.document_id, chunk_index = chunk.chunk_index))]
    async fn insert_chunk(&self, chunk: NewChunk) -> Result<ChunkRow, PipelineError> {
        let row = sqlx::query(
            r#"
            INSERT INTO chunks (document_id, chunk_index, content, embedding)
            VALUES ($1, $2, $3, $4)
            RETURNING id, document_id, chunk_index, content, created_at
            "#,
        )
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index as i64)
        .bind(&chunk.content)
        .bind(Vector::from(chunk.embedding))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| PipelineError::Storage(format!("insert chunk: {err}")))?;

        Ok(row_to_chunk(&row))
    }

    #[instrument(skip(self, embedding))]
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, created_at,
                   (embedding <=> $1)::float4 AS distance
            FROM chunks
            ORDER BY distance ASC
            LIMIT $2
            "#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| PipelineError::Storage(format!("similarity search: {err}")))?;

        Ok(rows
            .iter()
            .map(|row| ScoredChunk {
                chunk: row_to_chunk(row),
                distance: row.get::<f32, _>("distance"),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|err| PipelineError::Storage(format!("count chunks: {err}")))?;
        Ok(count as usize)
    }
}
