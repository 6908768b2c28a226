//! 답변 생성 모듈
//!
//! 조립된 컨텍스트와 질문으로 결정적인 프롬프트를 만들고
//! 생성 프로바이더를 한 번 호출합니다 (일시적 실패 시 한 번 재시도).
//!
//! 인용(citations)은 모델 출력에서 추출하지 않고 검색 결과를 그대로 전달합니다.

mod gemini;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::retry::retry_once;

pub use gemini::GeminiGeneration;

/// 근거 기반 답변 지시문
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant. Answer the question based ONLY \
on the provided context. Refer to the passages you rely on by their [chunk:<id>] markers. \
If the context doesn't contain the answer, say so.";

/// 컨텍스트가 비었을 때의 지시문
pub const NO_GROUNDING_INSTRUCTION: &str = "No passages from the ingested documents matched \
this question. State that no grounding was found in the ingested documents and do not answer \
from general knowledge.";

// ============================================================================
// Types
// ============================================================================

/// 생성된 답변
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// 검색 단계에서 넘어온 청크 ID (랭킹 순)
    pub citations: Vec<String>,
}

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// 텍스트 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 프롬프트로 텍스트 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// AnswerGenerator
// ============================================================================

/// 근거 기반 답변 생성기
pub struct AnswerGenerator {
    provider: Arc<dyn GenerationProvider>,
    retry_backoff: Duration,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>, config: &RagConfig) -> Self {
        Self {
            provider,
            retry_backoff: config.retry_backoff(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 질문에 답변
    ///
    /// 컨텍스트가 비어 있어도 생성 호출은 수행하며,
    /// 프롬프트가 모델에게 근거 없음을 알리도록 지시합니다.
    pub async fn answer(
        &self,
        question: &str,
        context_text: &str,
        citations: &[String],
    ) -> Result<Answer> {
        let prompt = build_prompt(question, context_text);
        let prompt = prompt.as_str();
        let provider = &self.provider;

        let text = retry_once("Generation request", self.retry_backoff, || {
            provider.generate(prompt)
        })
        .await?;

        if text.trim().is_empty() {
            return Err(RagError::generation(
                format!("{} returned an empty answer", self.provider.name()),
                false,
            ));
        }

        Ok(Answer {
            text,
            citations: citations.to_vec(),
        })
    }
}

/// 근거 기반 프롬프트 생성 (결정적)
pub fn build_prompt(question: &str, context_text: &str) -> String {
    if context_text.trim().is_empty() {
        format!(
            "{}\n\n{}\n\nQuestion: {}",
            SYSTEM_INSTRUCTION, NO_GROUNDING_INSTRUCTION, question
        )
    } else {
        format!(
            "{}\n\nContext:\n---\n{}\n---\n\nQuestion: {}",
            SYSTEM_INSTRUCTION, context_text, question
        )
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 생성 프로바이더 생성
pub fn create_generator(config: &RagConfig) -> Result<Arc<dyn GenerationProvider>> {
    let generator = GeminiGeneration::from_config(config)?;
    tracing::info!("Using Gemini generation model: {}", generator.name());
    Ok(Arc::new(generator))
}

// ============================================================================
// Tests
// ============================================================================
