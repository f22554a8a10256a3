//! Client for the provider's asynchronous file/batch job API.
//!
//! The flow is: upload a newline-delimited request file, create a job that
//! references it, poll the job by id until a terminal status, then download
//! the output file. Each request line carries an external tag
//! (`chunk-{index}`) so the unordered output can be mapped back to the
//! fragment it belongs to.

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::chunking::Fragment;
use crate::types::{JobStatus, PipelineError};

/// External tag attached to a fragment at submission time.
pub fn tag_for(index: usize) -> String {
    format!("chunk-{index}")
}

/// Snapshot of a job as last reported by the provider.
#[derive(Clone, Debug)]
pub struct JobState {
    pub id: String,
    pub status: JobStatus,
    pub output_file_id: Option<String>,
    /// Provider-supplied diagnostics, when present.
    pub detail: Option<String>,
    pub completed_count: u64,
    pub total_count: u64,
}

/// One `(tag, vector)` pair extracted from the job's output file.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedEmbedding {
    pub tag: String,
    pub vector: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct JobClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl JobClient {
    /// `base_url` is the provider root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }

    /// Serializes fragments into the newline-delimited request list, one
    /// embedding request per fragment, each carrying its external tag.
    pub fn request_lines(&self, fragments: &[Fragment]) -> String {
        let mut lines = String::new();
        for fragment in fragments {
            let line = json!({
                "custom_id": tag_for(fragment.index),
                "method": "POST",
                "url": "/v1/embeddings",
                "body": {
                    "model": self.model,
                    "input": fragment.content,
                    "dimensions": self.dimension,
                },
            });
            lines.push_str(&line.to_string());
            lines.push('\n');
        }
        lines
    }

    /// Uploads the serialized request list and creates a job for it.
    /// Returns the provider-assigned job id.
    #[instrument(skip(self, lines), fields(bytes = lines.len()))]
    pub async fn submit(&self, lines: String) -> Result<String, PipelineError> {
        let form = Form::new().text("purpose", "batch").part(
            "file",
            Part::text(lines)
                .file_name("requests.jsonl")
                .mime_str("application/jsonl")
                .map_err(|err| PipelineError::Provider(err.to_string()))?,
        );

        let upload: FileUploadResponse = self
            .post_checked(format!("{}/files", self.base_url), |req| req.multipart(form))
            .await?;

        let job: JobResponse = self
            .post_checked(format!("{}/batches", self.base_url), |req| {
                req.json(&json!({
                    "input_file_id": upload.id,
                    "endpoint": "/v1/embeddings",
                    "completion_window": "24h",
                }))
            })
            .await?;

        Ok(job.id)
    }

    /// Fetches the job's current status and progress counts.
    #[instrument(skip(self))]
    pub async fn status(&self, job_id: &str) -> Result<JobState, PipelineError> {
        let response = self
            .client
            .get(format!("{}/batches/{job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider(format!(
                "job status request failed ({status}): {body}"
            )));
        }

        let job: JobResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Provider(format!("malformed job response: {err}")))?;
        Ok(job.into_state())
    }

    /// Downloads the raw newline-delimited output of a completed job.
    #[instrument(skip(self))]
    pub async fn fetch_output(&self, file_id: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .get(format!("{}/files/{file_id}/content", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider(format!(
                "output fetch failed ({status}): {body}"
            )));
        }

        Ok(response.text().await?)
    }

    async fn post_checked<T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<T, PipelineError> {
        let response = build(self.client.post(&url).bearer_auth(&self.api_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider(format!(
                "request to {url} failed ({status}): {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|err| PipelineError::Provider(format!("malformed response from {url}: {err}")))
    }
}

/// Parses the job output, one result record per line, into tagged vectors.
pub fn parse_output(raw: &str) -> Result<Vec<TaggedEmbedding>, PipelineError> {
    let mut results = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: OutputRecord = serde_json::from_str(line)
            .map_err(|err| PipelineError::Provider(format!("malformed output line: {err}")))?;

        if let Some(error) = record.error {
            return Err(PipelineError::Provider(format!(
                "result for {} carries an error: {error}",
                record.custom_id
            )));
        }
        let response = record.response.ok_or_else(|| {
            PipelineError::Provider(format!("result for {} has no response", record.custom_id))
        })?;
        let entry = response.body.data.into_iter().next().ok_or_else(|| {
            PipelineError::Provider(format!("result for {} has no embedding", record.custom_id))
        })?;

        results.push(TaggedEmbedding {
            tag: record.custom_id,
            vector: entry.embedding,
        });
    }
    Ok(results)
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct JobResponse {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
    #[serde(default)]
    request_counts: Option<RequestCounts>,
}

#[derive(Deserialize, Default)]
struct RequestCounts {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    completed: u64,
}

impl JobResponse {
    fn into_state(self) -> JobState {
        let counts = self.request_counts.unwrap_or_default();
        JobState {
            id: self.id,
            status: map_status(&self.status),
            output_file_id: self.output_file_id,
            detail: self.errors.map(|v| v.to_string()),
            completed_count: counts.completed,
            total_count: counts.total,
        }
    }
}

/// Folds the provider's status vocabulary onto the six pipeline statuses.
/// Unknown strings are treated as pending; the polling deadline bounds them.
fn map_status(raw: &str) -> JobStatus {
    match raw {
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "expired" => JobStatus::Expired,
        "cancelled" => JobStatus::Cancelled,
        "in_progress" | "finalizing" | "cancelling" | "running" => JobStatus::Running,
        _ => JobStatus::Pending,
    }
}

#[derive(Deserialize)]
struct OutputRecord {
    custom_id: String,
    #[serde(default)]
    response: Option<OutputResponse>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OutputResponse {
    body: OutputBody,
}

#[derive(Deserialize)]
struct OutputBody {
    data: Vec<OutputEntry>,
}

#[derive(Deserialize)]
struct OutputEntry {
    embedding: Vec<f32>,
}
