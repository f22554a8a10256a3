//! The ingestion pipeline: chunk → plan → embed → persist, plus the query
//! half that runs the flow in reverse.
//!
//! One pipeline serves all three dispatch strategies. The chunking,
//! planning, and persistence stages are shared; only the embed step
//! differs, and each strategy keeps the failure semantics the providers
//! impose on it:
//!
//! * sync — whole-batch provider calls, whole-batch bounded retry,
//!   sequential per-fragment persistence after the batch succeeds;
//! * job — one asynchronous submission polled to a terminal status, with
//!   order reconstruction from tagged output; a terminal negative status
//!   is never retried;
//! * local — strictly sequential single-fragment calls with linear
//!   backoff, each success persisted before the next call.
//!
//! Work within one request never fans out: batches run one at a time and
//! fragments persist one at a time, so a failure aborts everything after
//! it while leaving earlier inserts in place.

pub mod reconcile;
pub mod retry;

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::batching::{self, Batch, BatchLimits};
use crate::chunking::{Chunker, Fragment, normalize_newlines};
use crate::config::{IngestConfig, PollConfig};
use crate::embeddings::job::{JobClient, JobState};
use crate::embeddings::Embedder;
use crate::stores::{ChunkStore, NewChunk, ScoredChunk};
use crate::types::{JobStatus, PipelineError};

use retry::{RetryPolicy, with_retry};

/// Number of results returned by a similarity query.
pub const TOP_K: usize = 5;

/// Search rounds performed by the recursive query walk: the query itself
/// plus one expansion over its hits.
pub const RECURSIVE_DEPTH: usize = 2;

/// Summary of one completed ingestion request.
#[derive(Clone, Copy, Debug, Default)]
pub struct IngestReport {
    pub chunks_processed: usize,
    pub batches: usize,
}

/// Shared chunk/plan/embed/persist orchestration.
#[derive(Clone, Copy, Debug)]
pub struct IngestPipeline {
    chunker: Chunker,
    batch_limits: BatchLimits,
    sync_retry: RetryPolicy,
    local_retry: RetryPolicy,
    poll: PollConfig,
}

impl IngestPipeline {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            chunker: Chunker::new(config.chunk_chars),
            batch_limits: config.batch,
            sync_retry: config.sync_retry,
            local_retry: config.local_retry,
            poll: config.poll,
        }
    }

    fn fragments(&self, text: &str) -> Vec<Fragment> {
        let normalized = normalize_newlines(text);
        self.chunker.fragments(&normalized).collect()
    }

    /// Synchronous batch ingestion: one provider call per planned batch,
    /// retried whole on failure, then persisted fragment by fragment.
    ///
    /// Persistence only starts after the batch's embed call has succeeded,
    /// so a provider retry never re-runs inserts from an earlier attempt.
    /// A storage failure mid-batch aborts the remaining inserts without
    /// rolling back the ones already written.
    #[instrument(skip(self, embedder, store, text), fields(document_id))]
    pub async fn ingest_sync(
        &self,
        embedder: &dyn Embedder,
        store: &dyn ChunkStore,
        document_id: &str,
        text: &str,
    ) -> Result<IngestReport, PipelineError> {
        let fragments = self.fragments(text);
        let batches = batching::plan(fragments, &self.batch_limits);
        let batch_count = batches.len();
        let mut processed = 0usize;

        for batch in batches {
            let vectors = self.embed_batch(embedder, &batch).await?;
            for (fragment, embedding) in batch.into_fragments().into_iter().zip(vectors) {
                store
                    .insert_chunk(NewChunk {
                        document_id: document_id.to_string(),
                        chunk_index: fragment.index,
                        content: fragment.content,
                        embedding,
                    })
                    .await?;
                processed += 1;
            }
        }

        info!(document_id, processed, batch_count, "sync ingestion complete");
        Ok(IngestReport {
            chunks_processed: processed,
            batches: batch_count,
        })
    }

    async fn embed_batch(
        &self,
        embedder: &dyn Embedder,
        batch: &Batch,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let inputs: Vec<String> = batch
            .fragments()
            .iter()
            .map(|f| f.content.clone())
            .collect();
        let scope = format!("batch starting at chunk {}", batch.start_index());
        with_retry(&self.sync_retry, &scope, || embedder.embed(&inputs)).await
    }

    /// Local ingestion: strictly sequential single-fragment calls with
    /// linear backoff, each success persisted before the next call. An
    /// exhausted fragment aborts the remainder of the document.
    #[instrument(skip(self, embedder, store, text), fields(document_id))]
    pub async fn ingest_local(
        &self,
        embedder: &dyn Embedder,
        store: &dyn ChunkStore,
        document_id: &str,
        text: &str,
    ) -> Result<IngestReport, PipelineError> {
        let fragments = self.fragments(text);
        let mut processed = 0usize;

        for fragment in fragments {
            let scope = format!("chunk {}", fragment.index);
            let input = vec![fragment.content.clone()];
            let vectors =
                with_retry(&self.local_retry, &scope, || embedder.embed(&input)).await?;
            let embedding = vectors.into_iter().next().ok_or_else(|| {
                PipelineError::Provider("local endpoint returned no vector".to_string())
            })?;

            store
                .insert_chunk(NewChunk {
                    document_id: document_id.to_string(),
                    chunk_index: fragment.index,
                    content: fragment.content,
                    embedding,
                })
                .await?;
            processed += 1;
        }

        info!(document_id, processed, "local ingestion complete");
        Ok(IngestReport {
            chunks_processed: processed,
            batches: 0,
        })
    }

    /// Asynchronous job ingestion: serialize all fragments into one tagged
    /// submission, poll to a terminal status, reconstruct submission order
    /// from the unordered output, then persist sequentially.
    #[instrument(skip(self, jobs, store, text), fields(document_id))]
    pub async fn ingest_job(
        &self,
        jobs: &JobClient,
        store: &dyn ChunkStore,
        document_id: &str,
        text: &str,
    ) -> Result<IngestReport, PipelineError> {
        let fragments = self.fragments(text);
        if fragments.is_empty() {
            return Ok(IngestReport::default());
        }

        let lines = jobs.request_lines(&fragments);
        let job_id = jobs.submit(lines).await?;
        info!(document_id, job_id, count = fragments.len(), "job submitted");

        let state = self.poll_until_terminal(jobs, &job_id).await?;
        if state.status != JobStatus::Completed {
            return Err(PipelineError::JobTerminal {
                id: state.id,
                status: state.status,
                detail: state.detail.unwrap_or_default(),
            });
        }

        let output_file_id = state.output_file_id.ok_or_else(|| {
            PipelineError::Provider(format!("completed job {job_id} has no output file"))
        })?;
        let raw = jobs.fetch_output(&output_file_id).await?;
        let results = crate::embeddings::job::parse_output(&raw)?;
        let ordered = reconcile::reconcile(fragments.len(), results)?;

        let mut processed = 0usize;
        for (fragment, embedding) in fragments.into_iter().zip(ordered) {
            store
                .insert_chunk(NewChunk {
                    document_id: document_id.to_string(),
                    chunk_index: fragment.index,
                    content: fragment.content,
                    embedding,
                })
                .await?;
            processed += 1;
        }

        info!(document_id, processed, job_id, "job ingestion complete");
        Ok(IngestReport {
            chunks_processed: processed,
            batches: 1,
        })
    }

    /// Polls at a fixed interval until the job reaches a terminal status
    /// or the deadline elapses. Transient transport errors keep the loop
    /// going rather than failing the job.
    async fn poll_until_terminal(
        &self,
        jobs: &JobClient,
        job_id: &str,
    ) -> Result<JobState, PipelineError> {
        let deadline = Instant::now() + self.poll.deadline;
        let mut polls = 0u32;
        let mut last_error: Option<PipelineError> = None;

        loop {
            polls += 1;
            match jobs.status(job_id).await {
                Ok(state) if state.status.is_terminal() => return Ok(state),
                Ok(state) => {
                    debug!(
                        job_id,
                        status = %state.status,
                        completed = state.completed_count,
                        total = state.total_count,
                        "job in flight"
                    );
                    last_error = None;
                }
                Err(err) => {
                    warn!(job_id, error = %err, "transient poll failure, continuing");
                    last_error = Some(err);
                }
            }

            if Instant::now() + self.poll.interval >= deadline {
                let source = last_error.unwrap_or_else(|| {
                    PipelineError::Provider(format!(
                        "job {job_id} still not terminal at deadline"
                    ))
                });
                return Err(PipelineError::RetryExhausted {
                    scope: format!("polling job {job_id}"),
                    attempts: polls,
                    source: Box::new(source),
                });
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Embeds one caller-supplied fragment and persists it with the given
    /// index. Backs the single-fragment insert route.
    pub async fn insert_one(
        &self,
        embedder: &dyn Embedder,
        store: &dyn ChunkStore,
        document_id: &str,
        chunk_index: usize,
        content: &str,
    ) -> Result<crate::stores::ChunkRow, PipelineError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::Validation(
                "chunk content is empty after trimming".to_string(),
            ));
        }
        let input = vec![trimmed.to_string()];
        let vectors = embedder.embed(&input).await?;
        let embedding = vectors
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Provider("provider returned no vector".to_string()))?;
        store
            .insert_chunk(NewChunk {
                document_id: document_id.to_string(),
                chunk_index,
                content: trimmed.to_string(),
                embedding,
            })
            .await
    }
}

/// Embeds `query` with the same model/dimension used for ingestion and
/// returns the nearest stored chunks, ascending by distance.
#[instrument(skip(embedder, store))]
pub async fn search_chunks(
    embedder: &dyn Embedder,
    store: &dyn ChunkStore,
    query: &str,
    top_k: usize,
) -> Result<Vec<ScoredChunk>, PipelineError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Validation("query text is empty".to_string()));
    }

    let input = vec![trimmed.to_string()];
    let vectors = embedder.embed(&input).await?;
    let embedding = vectors
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Provider("provider returned no vector".to_string()))?;

    store.search(&embedding, top_k).await
}

/// Expanding similarity search: the query's hits become queries themselves
/// for the next round, up to `depth` rounds in total.
///
/// Rows are deduplicated by id, so the walk terminates as soon as a round
/// discovers nothing new. The merged result is ordered by ascending
/// distance, each hit scored against the query text that found it.
#[instrument(skip(embedder, store))]
pub async fn recursive_search_chunks(
    embedder: &dyn Embedder,
    store: &dyn ChunkStore,
    query: &str,
    top_k: usize,
    depth: usize,
) -> Result<Vec<ScoredChunk>, PipelineError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Validation("query text is empty".to_string()));
    }

    let mut seen = HashSet::new();
    let mut found: Vec<ScoredChunk> = Vec::new();
    let mut frontier = vec![trimmed.to_string()];

    for round in 0..depth.max(1) {
        let mut next = Vec::new();
        for text in frontier {
            for hit in search_chunks(embedder, store, &text, top_k).await? {
                if seen.insert(hit.chunk.id) {
                    next.push(hit.chunk.content.clone());
                    found.push(hit);
                }
            }
        }
        debug!(round, discovered = found.len(), "expansion round complete");
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(found)
}
