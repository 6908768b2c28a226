//! 에러 타입 - RAG 코어 전체에서 사용하는 타입 에러
//!
//! 검증 실패는 외부 호출 전에, 업스트림 실패는 재시도 여부와 함께 전달됩니다.

use thiserror::Error;

/// RAG 코어 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 입력/파라미터 검증 실패 (외부 호출 전)
    #[error("Validation error: {0}")]
    Validation(String),

    /// 임베딩 서비스 실패
    #[error("Embedding service error: {message}")]
    EmbeddingService {
        message: String,
        /// 타임아웃, 429, 5xx 등 재시도 가능한 실패
        transient: bool,
    },

    /// 생성 서비스 실패
    #[error("Generation service error: {message}")]
    GenerationService { message: String, transient: bool },

    /// 임베딩 차원이 저장소의 확정된 차원과 다름 (재시도 안 함)
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 영속화 계층 실패
    #[error("Storage error: {0}")]
    Storage(String),

    /// 필수 결과/문서 없음
    #[error("Not found: {0}")]
    NotFound(String),

    /// 설정 검증 실패
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub fn embedding(message: impl Into<String>, transient: bool) -> Self {
        Self::EmbeddingService {
            message: message.into(),
            transient,
        }
    }

    pub fn generation(message: impl Into<String>, transient: bool) -> Self {
        Self::GenerationService {
            message: message.into(),
            transient,
        }
    }

    /// 한 번 재시도할 가치가 있는 실패인지
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmbeddingService { transient, .. } => *transient,
            Self::GenerationService { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// RAG 코어 Result 별칭
pub type Result<T> = std::result::Result<T, RagError>;
