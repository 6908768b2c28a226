//! Google Gemini 텍스트 생성
//!
//! `generateContent` 엔드포인트를 단일 턴으로 호출합니다.
//! 안전 필터로 차단된 응답은 재시도하지 않는 생성 에러로 처리합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GenerationProvider;
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::gemini::{http_client, model_url, post_json};

/// 차단으로 간주하는 finishReason
const BLOCKED_FINISH_REASONS: [&str; 4] = ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Gemini 생성 구현체
#[derive(Debug)]
pub struct GeminiGeneration {
    api_key: String,
    model: String,
    client: reqwest::Client,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiGeneration {
    pub fn new(api_key: String, model: String, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            client: http_client(timeout)?,
            temperature: 0.2,
            max_output_tokens: 2048,
        })
    }

    /// 설정에서 생성
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        Self::new(api_key, config.generation_model.clone(), config.request_timeout())
    }

    fn build_request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![GenerateContent {
                role: "user".to_string(),
                parts: vec![TextPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GenerateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

/// 응답에서 텍스트 추출 (차단 시 에러)
fn extract_text(response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(RagError::generation(
            format!("Prompt blocked by content filter: {}", reason),
            false,
        ));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RagError::generation("Response has no candidates", false))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(RagError::generation(
                format!("Answer blocked by content filter: {}", reason),
                false,
            ));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(text)
}

#[async_trait]
impl GenerationProvider for GeminiGeneration {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self.build_request(prompt);
        let url = model_url(&self.model, "generateContent");

        let response: GenerateResponse = post_json(&self.client, &url, &self.api_key, &request)
            .await
            .map_err(|f| f.into_generation_error())?;

        extract_text(response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
