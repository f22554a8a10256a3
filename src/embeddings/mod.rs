//! Embedding provider clients.
//!
//! All three dispatch strategies share one capability: turn a slice of
//! texts into one fixed-dimension vector per text, in submission order.
//! The [`Embedder`] trait captures that capability so the pipeline can
//! swap the embed step without duplicating the chunk/plan/persist flow.
//!
//! Retry is deliberately *not* implemented inside the clients; every
//! client is single-attempt and the bounded retry loop lives in
//! [`crate::pipeline::retry`] so the behavior is uniform and testable.

pub mod job;
pub mod local;
pub mod remote;

use async_trait::async_trait;

use crate::types::PipelineError;

pub use job::{JobClient, JobState};
pub use local::LocalEmbedder;
pub use remote::RemoteEmbedder;

/// Embeds a batch of texts into vectors, preserving input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns exactly one vector per input, in the same order as `inputs`.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Dimension of the vectors this embedder produces.
    fn dimension(&self) -> usize;
}

/// Deterministic hash-based embedder for tests and offline runs.
///
/// Identical text always maps to the identical unit vector, and distinct
/// texts map to (almost surely) distinct vectors, which is enough for
/// order and self-similarity assertions without a live provider.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            state ^= u64::from(*byte);
            state = state.wrapping_mul(0x0000_0100_0000_01b3);
        }

        let mut vector = Vec::with_capacity(self.dimension);
        for lane in 0..self.dimension {
            let mut mixed = state ^ (lane as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            mixed ^= mixed >> 33;
            mixed = mixed.wrapping_mul(0xff51_afd7_ed55_8ccd);
            mixed ^= mixed >> 33;
            let unit = (mixed as f64 / u64::MAX as f64) * 2.0 - 1.0;
            vector.push(unit as f32);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
