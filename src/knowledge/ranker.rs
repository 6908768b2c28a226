//! Similarity Ranker - 전체 스캔 코사인 랭킹
//!
//! 코퍼스는 수십~수백 청크 규모이므로 인덱스 없이 모든 벡터와 비교합니다.
//! 계약(점수 내림차순 top-k)은 구현이 인덱스로 바뀌어도 유지되어야 합니다.

use std::cmp::Ordering;

use serde::Serialize;

use super::vector::{cosine_similarity, Chunk};
use crate::error::{RagError, Result};

/// 랭킹 결과 항목
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub chunk_id: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
    /// 1부터 시작하는 순위
    pub rank: usize,
}

/// 쿼리 벡터로 코퍼스를 랭킹
///
/// 점수 내림차순 정렬 후 `score >= score_threshold`인 항목을 최대 `top_k`개 반환합니다.
/// 동점은 `sequence_index` 오름차순, `document_id` 오름차순으로 정합니다.
pub fn rank(
    query_vector: &[f32],
    corpus: &[Chunk],
    top_k: usize,
    score_threshold: f32,
) -> Vec<SimilarityResult> {
    let mut scored: Vec<(f32, &Chunk)> = corpus
        .iter()
        .map(|chunk| (cosine_similarity(query_vector, &chunk.embedding), chunk))
        .filter(|(score, _)| *score >= score_threshold)
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| compare_ranked(*sa, a, *sb, b));
    scored.truncate(top_k);

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, chunk))| SimilarityResult {
            chunk_id: chunk.id.clone(),
            score,
            rank: i + 1,
        })
        .collect()
}

/// 최소 한 건이 필요한 호출용 랭킹
///
/// 코퍼스가 비어 있으면 `NotFound`를 반환합니다.
pub fn rank_required(
    query_vector: &[f32],
    corpus: &[Chunk],
    top_k: usize,
    score_threshold: f32,
) -> Result<Vec<SimilarityResult>> {
    if corpus.is_empty() {
        return Err(RagError::NotFound("corpus is empty".into()));
    }
    Ok(rank(query_vector, corpus, top_k, score_threshold))
}

fn compare_ranked(score_a: f32, a: &Chunk, score_b: f32, b: &Chunk) -> Ordering {
    score_b
        .total_cmp(&score_a)
        .then_with(|| a.sequence_index.cmp(&b.sequence_index))
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.id.cmp(&b.id))
}

// ============================================================================
// Tests
// ============================================================================
