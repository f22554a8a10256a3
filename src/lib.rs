//! ```text
//! Raw text ──► chunking::Chunker ──► ordered fragments
//!                                        │
//!                                        ▼
//!                              batching::plan ──► batches
//!                                        │
//!              ┌─────────────────────────┼──────────────────────────┐
//!              ▼                         ▼                          ▼
//!     embeddings::RemoteEmbedder  embeddings::JobClient   embeddings::LocalEmbedder
//!       (sync batch + retry)     (submit ─ poll ─ fetch)  (per-fragment + backoff)
//!              │                         │                          │
//!              │            pipeline::reconcile (tag order)         │
//!              └─────────────────────────┼──────────────────────────┘
//!                                        ▼
//!                      stores::ChunkStore (pgvector / in-memory)
//!                                        │
//!                                        ▼
//!                    pipeline::search_chunks ◄── query text
//! ```

pub mod batching;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod pipeline;
pub mod server;
pub mod stores;
pub mod types;

pub use config::{IngestConfig, PollConfig};
pub use pipeline::{IngestPipeline, IngestReport, recursive_search_chunks, search_chunks};
pub use types::{JobStatus, PipelineError};
