//! End-to-end pipeline tests with the deterministic mock embedder and the
//! in-memory store. No network, suitable for CI.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use ragline::batching::BatchLimits;
use ragline::config::IngestConfig;
use ragline::embeddings::{Embedder, MockEmbedder};
use ragline::pipeline::retry::{Backoff, RetryPolicy};
use ragline::pipeline::{
    IngestPipeline, RECURSIVE_DEPTH, TOP_K, recursive_search_chunks, search_chunks,
};
use ragline::stores::{ChunkStore, MemoryChunkStore};
use ragline::types::PipelineError;

fn test_config() -> IngestConfig {
    IngestConfig {
        chunk_chars: 500,
        batch: BatchLimits {
            max_items: 4,
            max_total_chars: 2_000,
        },
        sync_retry: RetryPolicy::new(3, Backoff::None),
        local_retry: RetryPolicy::new(3, Backoff::None),
        ..IngestConfig::default()
    }
}

fn sample_text() -> String {
    let mut text = String::new();
    for i in 0..12 {
        text.push_str(&format!(
            "Paragraph {i} talks about subject {i} in enough detail to fill \
             out a realistic fragment of document text for the pipeline. ",
        ));
    }
    text
}

/// Embedder that fails its first `failures` calls, then delegates to the
/// mock. Used to probe the retry ceiling.
struct FlakyEmbedder {
    inner: MockEmbedder,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyEmbedder {
    fn new(failures: u32) -> Self {
        Self {
            inner: MockEmbedder::new(16),
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PipelineError::Provider(format!("simulated failure {call}")));
        }
        self.inner.embed(inputs).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[tokio::test]
async fn sync_ingestion_persists_every_fragment_in_order() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    let report = pipeline
        .ingest_sync(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap();

    assert!(report.chunks_processed > 1);
    assert!(report.batches > 0);

    let rows = store.rows().await;
    assert_eq!(rows.len(), report.chunks_processed);
    for (expected, row) in rows.iter().enumerate() {
        assert_eq!(row.chunk_index, expected as i64, "contiguous indices");
        assert_eq!(row.document_id, "doc.txt");
        assert!(!row.content.trim().is_empty());
        assert!(row.content.chars().count() <= 500);
    }
}

#[tokio::test]
async fn sync_ingestion_survives_exactly_max_retries_failures() {
    let config = IngestConfig {
        batch: BatchLimits {
            max_items: 1_000,
            max_total_chars: 100_000,
        },
        ..test_config()
    };
    let pipeline = IngestPipeline::new(&config);
    // Single batch; 3 failures then success fits a ceiling of 3 retries.
    let embedder = FlakyEmbedder::new(3);
    let store = MemoryChunkStore::new();

    let report = pipeline
        .ingest_sync(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), report.chunks_processed);
}

#[tokio::test]
async fn one_failure_past_the_ceiling_is_terminal_and_persists_nothing() {
    let config = IngestConfig {
        batch: BatchLimits {
            max_items: 1_000,
            max_total_chars: 100_000,
        },
        ..test_config()
    };
    let pipeline = IngestPipeline::new(&config);
    let embedder = FlakyEmbedder::new(4);
    let store = MemoryChunkStore::new();

    let err = pipeline
        .ingest_sync(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap_err();

    match err {
        PipelineError::RetryExhausted { scope, attempts, .. } => {
            assert!(scope.contains("batch starting at chunk 0"));
            assert_eq!(attempts, 4);
        }
        other => panic!("expected RetryExhausted, got {other}"),
    }
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn local_ingestion_is_sequential_and_persists_each_fragment() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    let report = pipeline
        .ingest_local(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap();

    let rows = store.rows().await;
    assert_eq!(rows.len(), report.chunks_processed);
    for (expected, row) in rows.iter().enumerate() {
        assert_eq!(row.chunk_index, expected as i64);
    }
}

#[tokio::test]
async fn local_ingestion_aborts_the_document_after_an_exhausted_fragment() {
    let pipeline = IngestPipeline::new(&test_config());
    // Fails 4 times: first fragment exhausts its 3 retries and aborts.
    let embedder = FlakyEmbedder::new(4);
    let store = MemoryChunkStore::new();

    let err = pipeline
        .ingest_local(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap_err();

    match err {
        PipelineError::RetryExhausted { scope, .. } => assert!(scope.contains("chunk 0")),
        other => panic!("expected RetryExhausted, got {other}"),
    }
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn round_trip_query_finds_the_ingested_fragment() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    pipeline
        .ingest_sync(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap();

    // Query with one fragment's exact stored text; embedding-space
    // self-similarity must place it in the top results.
    let rows = store.rows().await;
    let target = rows[rows.len() / 2].content.clone();

    let hits = search_chunks(&embedder, &store, &target, TOP_K).await.unwrap();
    assert!(hits.len() <= TOP_K);
    assert!(
        hits.iter().any(|hit| hit.chunk.content == target),
        "exact fragment text should appear among the top results"
    );
    assert!(hits[0].distance <= hits[hits.len() - 1].distance);
}

#[tokio::test]
async fn query_returns_at_most_top_k() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    pipeline
        .ingest_sync(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap();
    assert!(store.count().await.unwrap() > TOP_K);

    let hits = search_chunks(&embedder, &store, "subject", TOP_K).await.unwrap();
    assert_eq!(hits.len(), TOP_K);
}

#[tokio::test]
async fn recursive_query_expands_without_duplicates() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    pipeline
        .ingest_sync(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap();

    let rows = store.rows().await;
    let target = rows[0].content.clone();

    let direct = search_chunks(&embedder, &store, &target, TOP_K).await.unwrap();
    let expanded =
        recursive_search_chunks(&embedder, &store, &target, TOP_K, RECURSIVE_DEPTH)
            .await
            .unwrap();

    // The walk starts from the direct hits, so it can only add to them.
    assert!(expanded.len() >= direct.len());
    assert!(expanded.iter().any(|hit| hit.chunk.content == target));

    let mut ids: Vec<i64> = expanded.iter().map(|hit| hit.chunk.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), expanded.len(), "each row appears once");

    for pair in expanded.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn recursive_query_with_depth_one_matches_a_plain_search() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    pipeline
        .ingest_sync(&embedder, &store, "doc.txt", &sample_text())
        .await
        .unwrap();

    let direct = search_chunks(&embedder, &store, "subject", TOP_K).await.unwrap();
    let single = recursive_search_chunks(&embedder, &store, "subject", TOP_K, 1)
        .await
        .unwrap();

    let direct_ids: Vec<i64> = direct.iter().map(|hit| hit.chunk.id).collect();
    let single_ids: Vec<i64> = single.iter().map(|hit| hit.chunk.id).collect();
    assert_eq!(direct_ids, single_ids);
}

#[tokio::test]
async fn blank_recursive_query_is_a_validation_error() {
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();
    let err = recursive_search_chunks(&embedder, &store, " ", TOP_K, RECURSIVE_DEPTH)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn blank_query_is_a_validation_error() {
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();
    let err = search_chunks(&embedder, &store, "   ", TOP_K).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn empty_document_ingests_zero_chunks() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    let report = pipeline
        .ingest_sync(&embedder, &store, "empty.txt", "   \n \r\n ")
        .await
        .unwrap();
    assert_eq!(report.chunks_processed, 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn insert_one_embeds_and_returns_the_stored_row() {
    let pipeline = IngestPipeline::new(&test_config());
    let embedder = MockEmbedder::new(16);
    let store = MemoryChunkStore::new();

    let row = pipeline
        .insert_one(&embedder, &store, "manual.txt", 7, "  some content  ")
        .await
        .unwrap();
    assert_eq!(row.chunk_index, 7);
    assert_eq!(row.content, "some content");

    let err = pipeline
        .insert_one(&embedder, &store, "manual.txt", 8, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}
