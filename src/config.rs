//! 설정 모듈
//!
//! 프로세스 시작 시 한 번 생성되어 각 컴포넌트에 참조로 전달됩니다.
//! 코어 로직 내부에서는 환경변수를 직접 읽지 않습니다.
//!
//! 우선순위: 기본값 < 환경변수

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::ChunkConfig;

/// 토큰 수 추정에 쓰는 문자/토큰 비율
pub const CHARS_PER_TOKEN: usize = 4;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.grounded-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".grounded-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 임베딩 백엔드 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Gemini API
    Gemini,
    /// 해시 기반 결정적 임베딩 (오프라인)
    Mock,
}

impl FromStr for EmbeddingBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            other => Err(RagError::Config(format!(
                "Unknown embedding provider: {}. Must be gemini or mock",
                other
            ))),
        }
    }
}

/// RAG 코어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 기본 top-k
    pub top_k: usize,
    /// 기본 최소 유사도
    pub score_threshold: f32,
    /// 컨텍스트 최대 문자 수
    pub max_context_chars: usize,
    /// 임베딩 차원 (저장소가 비어 있을 때의 기대값)
    pub embedding_dim: usize,
    /// 임베딩 모델 입력 토큰 한도
    pub max_embedding_tokens: usize,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub generation_model: String,
    /// 재시도 전 대기 (ms)
    pub retry_backoff_ms: u64,
    /// 쿼리 전체 데드라인 (초)
    pub query_timeout_secs: u64,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
    /// Gemini API 키
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            top_k: 3,
            score_threshold: 0.0,
            max_context_chars: 4000,
            embedding_dim: 768,
            max_embedding_tokens: 2048,
            embedding_backend: EmbeddingBackend::Gemini,
            embedding_model: "gemini-embedding-001".to_string(),
            generation_model: "gemini-2.0-flash".to_string(),
            retry_backoff_ms: 500,
            query_timeout_secs: 60,
            request_timeout_secs: 30,
            data_dir: get_data_dir(),
            api_key: None,
        }
    }
}

impl RagConfig {
    /// 기본값 + 환경변수로 설정 생성
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.api_key = get_api_key();

        if let Some(dir) = env_var("GROUNDED_RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(top_k) = env_parse("GROUNDED_RAG_TOP_K")? {
            config.top_k = top_k;
        }
        if let Some(threshold) = env_parse("GROUNDED_RAG_SCORE_THRESHOLD")? {
            config.score_threshold = threshold;
        }
        if let Some(max_chars) = env_parse("GROUNDED_RAG_MAX_CONTEXT_CHARS")? {
            config.max_context_chars = max_chars;
        }
        if let Some(secs) = env_parse("GROUNDED_RAG_QUERY_TIMEOUT_SECS")? {
            config.query_timeout_secs = secs;
        }
        if let Some(backend) = env_var("GROUNDED_RAG_EMBEDDING_PROVIDER") {
            config.embedding_backend = backend.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// 설정 일관성 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate().map_err(|e| match e {
            RagError::Validation(msg) => RagError::Config(msg),
            other => other,
        })?;

        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".into()));
        }
        if !(-1.0..=1.0).contains(&self.score_threshold) {
            return Err(RagError::Config(format!(
                "score_threshold ({}) must be within [-1, 1]",
                self.score_threshold
            )));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::Config(
                "max_context_chars must be greater than zero".into(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(RagError::Config("embedding_dim must be greater than zero".into()));
        }
        if estimate_tokens_for_chars(self.chunk.max_chunk_chars) > self.max_embedding_tokens {
            return Err(RagError::Config(format!(
                "max_chunk_chars ({}) exceeds the embedding token limit ({} tokens)",
                self.chunk.max_chunk_chars, self.max_embedding_tokens
            )));
        }
        if self.query_timeout_secs == 0 {
            return Err(RagError::Config("query_timeout_secs must be greater than zero".into()));
        }

        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// SQLite DB 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }

    /// API 키 (없으면 Config 에러)
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RagError::Config(
                "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
                 Get your API key at: https://aistudio.google.com/app/apikey"
                    .into(),
            )
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수로 토큰 수 추정 (올림)
pub fn estimate_tokens_for_chars(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// API 키 로드
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Option<String> {
    for name in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Some(key) = env_var(name) {
            tracing::debug!("Using API key from {}", name);
            return Some(key);
        }
    }
    None
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RagError::Config(format!("Invalid {}={}: {}", name, raw, e))),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
