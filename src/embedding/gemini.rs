//! Google Gemini 임베딩
//!
//! `batchEmbedContents`로 한 번의 요청에 여러 텍스트를 임베딩합니다.
//! source: https://ai.google.dev/gemini-api/docs/embeddings

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, EmbeddingTask};
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::gemini::{http_client, model_url, post_json};

/// gemini-embedding-001이 지원하는 출력 차원 (MRL)
pub const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 이름 (예: gemini-embedding-001)
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn new(
        api_key: String,
        model: String,
        dimension: usize,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            return Err(RagError::Config(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        Ok(Self {
            api_key,
            model,
            client: http_client(timeout)?,
            dimension,
        })
    }

    /// 설정에서 생성
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        Self::new(
            api_key,
            config.embedding_model.clone(),
            config.embedding_dim,
            config.request_timeout(),
        )
    }

    /// 임베딩 차원 반환
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn build_request(&self, texts: &[String], task: EmbeddingTask) -> BatchEmbedRequest {
        let task_type = match task {
            EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::Query => "RETRIEVAL_QUERY",
        };

        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: EmbedContent {
                        parts: vec![EmbedPart { text: text.clone() }],
                    },
                    task_type: task_type.to_string(),
                    output_dimensionality: Some(self.dimension),
                })
                .collect(),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        let request = self.build_request(texts, task);
        let url = model_url(&self.model, "batchEmbedContents");

        let response: BatchEmbedResponse = post_json(&self.client, &url, &self.api_key, &request)
            .await
            .map_err(|f| f.into_embedding_error())?;

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
