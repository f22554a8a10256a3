//! Pipeline tuning knobs, assembled once at startup and passed by value.
//!
//! Nothing here is a global: the binary builds an [`IngestConfig`] from
//! flags/env and threads it into the pipeline and clients explicitly, so
//! tests can substitute their own.

use std::time::Duration;

use crate::batching::BatchLimits;
use crate::pipeline::retry::{Backoff, RetryPolicy};

/// Cadence and ceiling for the asynchronous job polling loop.
///
/// The interval stays in whole seconds to respect provider rate limits;
/// the deadline bounds the worst case so a wedged job cannot hold its
/// serving request forever.
#[derive(Clone, Copy, Debug)]
pub struct PollConfig {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(600),
        }
    }
}

/// Everything the ingestion pipeline needs to know about sizes and retries.
#[derive(Clone, Copy, Debug)]
pub struct IngestConfig {
    /// Maximum character length per fragment.
    pub chunk_chars: usize,
    pub batch: BatchLimits,
    /// Whole-batch retry used by the synchronous path.
    pub sync_retry: RetryPolicy,
    /// Per-fragment retry used by the local path (linear backoff).
    pub local_retry: RetryPolicy,
    pub poll: PollConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 500,
            batch: BatchLimits::default(),
            sync_retry: RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(500))),
            local_retry: RetryPolicy::new(3, Backoff::Linear(Duration::from_millis(500))),
            poll: PollConfig::default(),
        }
    }
}
