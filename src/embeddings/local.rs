//! Client for a single-input local inference endpoint.
//!
//! Local services in the Ollama mold accept one prompt per call and have a
//! small input-size ceiling, so this client rejects multi-input batches
//! outright; the pipeline's local path feeds it one fragment at a time.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::types::PipelineError;

use super::Embedder;

#[derive(Clone, Debug)]
pub struct LocalEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl LocalEmbedder {
    /// `base_url` is the inference service root, e.g. `http://localhost:11434`.
    pub fn new(
        client: Client,
        base_url: &str,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            dimension,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct LocalRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct LocalResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for LocalEmbedder {
    #[instrument(skip(self, inputs))]
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let [input] = inputs else {
            return Err(PipelineError::Provider(format!(
                "local endpoint accepts one input per call, got {}",
                inputs.len()
            )));
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&LocalRequest {
                model: &self.model,
                prompt: input,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider(format!(
                "local embed request failed ({status}): {body}"
            )));
        }

        let parsed: LocalResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Provider(format!("malformed local response: {err}")))?;

        Ok(vec![parsed.embedding])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn embeds_a_single_input() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embeddings")
                    .json_body(json!({"model": "all-minilm", "prompt": "hello"}));
                then.status(200).json_body(json!({"embedding": [1.0, 0.0]}));
            })
            .await;

        let embedder = LocalEmbedder::new(Client::new(), &server.base_url(), "all-minilm", 2);
        let vectors = embedder.embed(&["hello".to_string()]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0]]);
    }

    #[tokio::test]
    async fn rejects_multi_input_batches() {
        let embedder = LocalEmbedder::new(Client::new(), "http://localhost:1", "m", 2);
        let err = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Provider(_)));
    }
}
