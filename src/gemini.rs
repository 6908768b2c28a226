//! Gemini REST 공통 헬퍼
//!
//! 임베딩/생성 프로바이더가 공유하는 HTTP 호출과 실패 분류입니다.
//! API 키는 URL이 아닌 `x-goog-api-key` 헤더로 전송합니다.
//!
//! source: https://ai.google.dev/api

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Gemini 모델 엔드포인트 베이스
pub(crate) const GEMINI_API_BASE: &str =
    "https://generativelanguage.googleapis.com/v1beta/models";

/// 호출 실패 분류
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallFailure {
    /// 타임아웃, 연결 실패, 429, 5xx
    Transient(String),
    /// 입력 토큰 한도 초과 (400)
    TokenLimit(String),
    /// 그 외 실패 (재시도 무의미)
    Fatal(String),
}

impl CallFailure {
    pub(crate) fn into_embedding_error(self) -> RagError {
        match self {
            Self::Transient(msg) => RagError::embedding(msg, true),
            Self::TokenLimit(msg) => RagError::Validation(msg),
            Self::Fatal(msg) => RagError::embedding(msg, false),
        }
    }

    /// 토큰 한도 초과도 재시도 없는 생성 에러
    pub(crate) fn into_generation_error(self) -> RagError {
        match self {
            Self::Transient(msg) => RagError::generation(msg, true),
            Self::TokenLimit(msg) | Self::Fatal(msg) => RagError::generation(msg, false),
        }
    }
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// 모델 메서드 URL
pub(crate) fn model_url(model: &str, method: &str) -> String {
    format!("{}/{}:{}", GEMINI_API_BASE, model, method)
}

/// 타임아웃이 설정된 HTTP 클라이언트
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// JSON POST 후 응답 파싱
pub(crate) async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    request: &Req,
) -> std::result::Result<Resp, CallFailure>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let response = client
        .post(url)
        .header("x-goog-api-key", api_key)
        .json(request)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                CallFailure::Transient(format!("Request failed: {}", e))
            } else {
                CallFailure::Fatal(format!("Request failed: {}", e))
            }
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CallFailure::Transient(format!("Failed to read response body: {}", e)))?;

    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|e| CallFailure::Fatal(format!("Failed to parse response: {}", e)));
    }

    Err(classify_status(status.as_u16(), &body))
}

/// HTTP 상태 + 본문으로 실패 분류
pub(crate) fn classify_status(status: u16, body: &str) -> CallFailure {
    let message = match serde_json::from_str::<GeminiError>(body) {
        Ok(err) => format!(
            "Gemini API error ({} {}): {}",
            status, err.error.status, err.error.message
        ),
        Err(_) => format!("Gemini API error ({}): {}", status, body),
    };

    match status {
        429 | 500..=599 => CallFailure::Transient(message),
        400 if message.to_lowercase().contains("token") => CallFailure::TokenLimit(message),
        _ => CallFailure::Fatal(message),
    }
}

// ============================================================================
// Tests
// ============================================================================
