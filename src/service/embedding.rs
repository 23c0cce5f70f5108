//! Optional vector capability: embeddings plus a similarity index.
//!
//! Everything here is best-effort. A project configured without the vector
//! capability simply skips it, and a failing embedding or index call is
//! logged and degraded (no stored vector, empty query result) — never
//! raised to the pipeline.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ServiceError;
use crate::config::{ReasoningConfig, VectorConfig};

/// Metadata stored alongside a verbatim vector and returned by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbatimMetadata {
    pub speaker: String,
    pub source_file: String,
    pub kind: String,
}

/// Text → vector. Implementations must be concurrency-safe.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
    fn dimension(&self) -> usize;
}

/// Vector similarity index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        id: Uuid,
        vector: Vec<f32>,
        metadata: VerbatimMetadata,
    ) -> Result<(), ServiceError>;

    /// Top-k nearest entries by cosine similarity, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VerbatimMetadata>, ServiceError>;
}

// ---------------------------------------------------------------------------
// HTTP embedder
// ---------------------------------------------------------------------------

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint.
/// Shares the reasoning endpoint's base URL and credentials.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    pub fn new(reasoning: &ReasoningConfig, vector: &VectorConfig) -> Result<Self, ServiceError> {
        let api_key = reasoning
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ServiceError::MissingCredentials)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(reasoning.timeout_secs))
            .build()
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: reasoning.base_url.trim_end_matches('/').to_string(),
            model: vector.embedding_model.clone(),
            api_key,
            dimension: vector.dimension,
        })
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/embeddings", self.base_url)
        } else {
            format!("{}/v1/embeddings", self.base_url)
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ServiceError::Connection(self.base_url.clone())
                } else {
                    ServiceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ResponseParsing(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ServiceError::ResponseParsing("Response carried no embedding".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ---------------------------------------------------------------------------
// In-memory index
// ---------------------------------------------------------------------------

/// Process-local vector index. Good enough for single-run retrieval and
/// for tests; the trait boundary keeps a hosted index swappable.
pub struct InMemoryVectorIndex {
    entries: Mutex<Vec<StoredVector>>,
}

struct StoredVector {
    id: Uuid,
    vector: Vec<f32>,
    metadata: VerbatimMetadata,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        id: Uuid,
        vector: Vec<f32>,
        metadata: VerbatimMetadata,
    ) -> Result<(), ServiceError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.iter_mut().find(|e| e.id == id) {
            existing.vector = vector;
            existing.metadata = metadata;
        } else {
            entries.push(StoredVector {
                id,
                vector,
                metadata,
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VerbatimMetadata>, ServiceError> {
        let entries = self.entries.lock().unwrap();
        let mut scored: Vec<(f32, &StoredVector)> = entries
            .iter()
            .map(|e| (cosine_similarity(vector, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, e)| e.metadata.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Bundled capability
// ---------------------------------------------------------------------------

/// Embedder + index pair as the pipeline consumes them. Held as an
/// `Option` by the orchestrator: absence disables vector features
/// silently.
pub struct VectorCapability {
    embedder: std::sync::Arc<dyn EmbeddingModel>,
    index: std::sync::Arc<dyn VectorIndex>,
    top_k: usize,
}

impl VectorCapability {
    pub fn new(
        embedder: std::sync::Arc<dyn EmbeddingModel>,
        index: std::sync::Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }

    /// Embed and upsert one verbatim, best-effort. Returns the stored id
    /// when it worked; failures are logged and swallowed.
    pub async fn store_verbatim(&self, text: &str, metadata: VerbatimMetadata) -> Option<Uuid> {
        let vector = match self.embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Failed to embed verbatim");
                return None;
            }
        };

        let id = Uuid::new_v4();
        match self.index.upsert(id, vector, metadata).await {
            Ok(()) => Some(id),
            Err(e) => {
                tracing::error!(error = %e, "Failed to store verbatim vector");
                None
            }
        }
    }

    /// Similar-verbatim lookup, best-effort. Failures degrade to empty.
    pub async fn find_similar(&self, query: &str) -> Vec<VerbatimMetadata> {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Vector search failed at embedding");
                return Vec::new();
            }
        };

        match self.index.query(&vector, self.top_k).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(error = %e, "Vector search failed at query");
                Vec::new()
            }
        }
    }
}
