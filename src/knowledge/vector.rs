//! Vector Store - 청크 레코드 저장 트레이트 및 유틸리티
//!
//! 저장소는 문서 단위로만 쓰고 지웁니다. 청크는 커밋 이후 변경되지 않으며,
//! 검색은 전체 스캔(exhaustive scan)으로 수행합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 수집된 문서 (수집 이후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

/// 새 문서 입력용 구조체
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    /// 비어 있으면 "Untitled"
    pub title: Option<String>,
    pub raw_text: String,
}

/// 청크 레코드 (저장용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// 문서 ID (documents.id)
    pub document_id: String,
    /// 청크 인덱스 (0-based, 문서 내 복원 순서)
    pub sequence_index: usize,
    /// 청크 텍스트
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// 문서 목록 항목
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub chunk_count: usize,
}

/// 저장소 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    /// 확정된 임베딩 차원 (첫 append 이전에는 None)
    pub embedding_dim: Option<usize>,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// - `append`는 문서와 그 청크 전체를 원자적으로 커밋합니다.
/// - `scan`은 일관된 스냅샷을 반환합니다. 진행 중인 append는 전부 보이거나 전부 안 보입니다.
/// - 수정 연산은 없습니다. 삭제는 문서 단위로만 가능합니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 문서 + 청크 원자적 저장
    async fn append(&self, document: &Document, chunks: &[Chunk]) -> Result<()>;

    /// 커밋된 모든 청크
    async fn scan(&self) -> Result<Vec<Chunk>>;

    /// 문서의 청크 (`sequence_index` 순)
    async fn get(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// 문서 조회
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    /// 문서 목록 (최신순)
    async fn list_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>>;

    /// 문서와 모든 청크를 하나의 단위로 삭제
    async fn delete_document(&self, document_id: &str) -> Result<bool>;

    /// 확정된 임베딩 차원
    async fn dimension(&self) -> Result<Option<usize>>;

    /// 저장소 통계
    async fn stats(&self) -> Result<StoreStats>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다.
/// 어느 한쪽의 norm이 0이거나 길이가 다르면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// append 입력 검증
///
/// 청크가 모두 해당 문서 소속이고, `sequence_index`가 0부터 연속이며,
/// 임베딩 길이가 하나로 통일되고 확정 차원과 일치해야 합니다.
/// 성공 시 배치의 임베딩 차원을 반환합니다.
pub fn validate_append(
    document: &Document,
    chunks: &[Chunk],
    established_dim: Option<usize>,
) -> Result<usize> {
    let first = chunks.first().ok_or_else(|| {
        RagError::Storage(format!("document {} has no chunks to append", document.id))
    })?;

    let dim = first.embedding.len();
    if dim == 0 {
        return Err(RagError::Storage("chunk embedding is empty".into()));
    }

    if let Some(expected) = established_dim {
        if expected != dim {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: dim,
            });
        }
    }

    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.document_id != document.id {
            return Err(RagError::Storage(format!(
                "chunk {} belongs to document {}, not {}",
                chunk.id, chunk.document_id, document.id
            )));
        }
        if chunk.sequence_index != i {
            return Err(RagError::Storage(format!(
                "chunk {} has sequence_index {}, expected {}",
                chunk.id, chunk.sequence_index, i
            )));
        }
        if chunk.embedding.len() != dim {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: chunk.embedding.len(),
            });
        }
    }

    Ok(dim)
}

// ============================================================================
// Tests
// ============================================================================
