//! Core error and status types shared across the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of an asynchronous embedding job as reported by the provider.
///
/// Providers report finer-grained in-flight states (validating, finalizing,
/// cancelling, ...); those are folded into [`Pending`](Self::Pending) or
/// [`Running`](Self::Running) at the client boundary. Only the four terminal
/// states stop the polling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl JobStatus {
    /// Returns `true` when no further status transition will occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// Errors surfaced by the ingestion pipeline and its collaborators.
///
/// Every variant is fatal to the request that produced it; retries are
/// strictly local and bounded, and once [`RetryExhausted`](Self::RetryExhausted)
/// fires the error propagates to the request boundary unchanged.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or missing request input (empty upload, blank query, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport failure or non-success response from an embedding service.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// An asynchronous job reached a terminal state other than `completed`.
    /// Terminal negative statuses are unrecoverable; the job is never retried.
    #[error("job {id} ended as {status}: {detail}")]
    JobTerminal {
        id: String,
        status: JobStatus,
        detail: String,
    },

    /// A bounded retry loop ran out of attempts for a batch, a fragment, or
    /// the job polling deadline.
    #[error("retries exhausted for {scope} after {attempts} attempts")]
    RetryExhausted {
        scope: String,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    /// Insert or query failure against the vector store.
    #[error("storage error: {0}")]
    Storage(String),

    /// A job result tag was missing, duplicated, or unparseable.
    #[error("order reconciliation error: {0}")]
    Reconciliation(String),
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Provider(err.to_string())
    }
}
