//! Context Assembler - 예산 내 컨텍스트 조립
//!
//! 랭킹 순서대로 청크를 탐욕적으로 담고, 예산을 넘기는 첫 청크에서 멈춥니다.
//! 각 청크 앞에는 인용 마커 `[chunk:<id>]`가 붙습니다.

use std::collections::HashMap;

use super::ranker::SimilarityResult;
use super::vector::Chunk;

/// 청크 블록 사이 구분자
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// 조립된 컨텍스트
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    /// 인용 마커가 포함된 컨텍스트 텍스트
    pub text: String,
    /// 포함된 청크 ID (랭킹 순)
    pub citations: Vec<String>,
}

impl AssembledContext {
    /// 근거 없음 여부
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// 인용 마커
pub fn citation_marker(chunk_id: &str) -> String {
    format!("[chunk:{}]", chunk_id)
}

/// 랭킹 결과로 컨텍스트 조립
///
/// 예산은 마커와 구분자를 포함한 문자 수로 계산하므로
/// `text`의 문자 수는 항상 `max_context_chars` 이하입니다.
/// 조회 테이블에 없는 청크는 건너뜁니다.
pub fn assemble(
    ranked: &[SimilarityResult],
    chunk_lookup: &HashMap<&str, &Chunk>,
    max_context_chars: usize,
) -> AssembledContext {
    let mut context = AssembledContext::default();
    let mut used = 0usize;

    for result in ranked {
        let Some(chunk) = chunk_lookup.get(result.chunk_id.as_str()) else {
            tracing::warn!("Ranked chunk {} missing from lookup", result.chunk_id);
            continue;
        };

        let block = format!("{}\n{}", citation_marker(&chunk.id), chunk.text);
        let separator_len = if context.citations.is_empty() {
            0
        } else {
            CONTEXT_SEPARATOR.chars().count()
        };
        let block_len = separator_len + block.chars().count();

        if used + block_len > max_context_chars {
            break;
        }

        if separator_len > 0 {
            context.text.push_str(CONTEXT_SEPARATOR);
        }
        context.text.push_str(&block);
        context.citations.push(chunk.id.clone());
        used += block_len;
    }

    tracing::debug!(
        "Assembled context: {} chunks, {} chars",
        context.citations.len(),
        used
    );
    context
}

// ============================================================================
// Tests
// ============================================================================
