//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트 배치를 고정 차원 벡터로 변환합니다.
//! 프로바이더는 외부 호출만 담당하고, `EmbeddingAdapter`가
//! 토큰 한도 사전 검사, 단일 재시도, 차원 검증을 수행합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let adapter = EmbeddingAdapter::new(create_embedder(&config)?, &config);
//! let vectors = adapter.embed(&texts, EmbeddingTask::Document).await?;
//! ```

mod gemini;
mod mock;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{estimate_tokens_for_chars, EmbeddingBackend, RagConfig};
use crate::error::{RagError, Result};
use crate::retry::retry_once;

pub use gemini::{GeminiEmbedding, SUPPORTED_DIMENSIONS};
pub use mock::MockEmbedding;

/// 기본 배치 상한 (Gemini batchEmbedContents 요청당 최대 100건)
pub const MAX_BATCH_SIZE: usize = 100;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 용도 (문서 저장 / 쿼리)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    Document,
    Query,
}

/// 임베딩 프로바이더 트레이트
///
/// 출력 순서는 입력 순서와 같아야 합니다 (`output[i]` <-> `texts[i]`).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩
    ///
    /// `texts.len()`은 항상 `max_batch_size()` 이하입니다.
    async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>>;

    /// 한 번의 호출에 보낼 수 있는 최대 입력 수
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// EmbeddingAdapter
// ============================================================================

/// 임베딩 어댑터
///
/// 같은 인스턴스가 반환하는 벡터는 모두 같은 차원이어야 합니다.
/// 처음 관측한 차원과 다른 벡터가 오면 `DimensionMismatch`로 실패합니다.
pub struct EmbeddingAdapter {
    provider: Arc<dyn EmbeddingProvider>,
    max_tokens: usize,
    retry_backoff: Duration,
    /// 0 = 아직 관측 전
    observed_dim: AtomicUsize,
}

impl EmbeddingAdapter {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_embedding_tokens,
            retry_backoff: config.retry_backoff(),
            observed_dim: AtomicUsize::new(0),
        }
    }

    /// 기대 차원을 미리 고정 (저장소의 확정 차원 등)
    pub fn with_dimension(self, dimension: usize) -> Self {
        self.observed_dim.store(dimension, Ordering::SeqCst);
        self
    }

    /// 관측된 차원
    pub fn dimension(&self) -> Option<usize> {
        match self.observed_dim.load(Ordering::SeqCst) {
            0 => None,
            dim => Some(dim),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 텍스트 배치 임베딩
    pub async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.check_inputs(texts)?;

        let provider = &self.provider;
        let batch_size = provider.max_batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        // 배치 중 하나라도 실패하면 전체가 실패합니다.
        for batch in texts.chunks(batch_size) {
            let embedded = retry_once("Embedding request", self.retry_backoff, || {
                provider.embed_batch(batch, task)
            })
            .await?;

            if embedded.len() != batch.len() {
                return Err(RagError::embedding(
                    format!(
                        "{} returned {} vectors for {} inputs",
                        provider.name(),
                        embedded.len(),
                        batch.len()
                    ),
                    false,
                ));
            }
            vectors.extend(embedded);
        }

        for vector in &vectors {
            self.check_dimension(vector.len())?;
        }

        tracing::debug!(
            "Embedded {} texts via {} (dim={})",
            texts.len(),
            self.provider.name(),
            self.dimension().unwrap_or(0)
        );
        Ok(vectors)
    }

    /// 단일 텍스트 임베딩
    pub async fn embed_one(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()], task).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::embedding("empty embedding response", false))
    }

    /// 빈 입력 / 토큰 한도 사전 검사
    fn check_inputs(&self, texts: &[String]) -> Result<()> {
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                return Err(RagError::Validation(format!("embedding input {} is empty", i)));
            }
            let tokens = estimate_tokens_for_chars(text.chars().count());
            if tokens > self.max_tokens {
                return Err(RagError::Validation(format!(
                    "embedding input {} is ~{} tokens, limit is {}",
                    i, tokens, self.max_tokens
                )));
            }
        }
        Ok(())
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual == 0 {
            return Err(RagError::embedding("provider returned an empty vector", false));
        }
        match self
            .observed_dim
            .compare_exchange(0, actual, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(()),
            Err(expected) if expected == actual => Ok(()),
            Err(expected) => Err(RagError::DimensionMismatch { expected, actual }),
        }
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding_backend {
        EmbeddingBackend::Gemini => {
            let embedder = GeminiEmbedding::from_config(config)?;
            tracing::info!(
                "Using Gemini API embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        EmbeddingBackend::Mock => {
            tracing::info!(
                "Using offline mock embedding (dimension: {})",
                config.embedding_dim
            );
            Ok(Arc::new(MockEmbedding::new(config.embedding_dim)))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
