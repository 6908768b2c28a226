//! Text Chunking Module
//!
//! 슬라이딩 윈도우 텍스트 분할을 제공합니다.
//! 연속된 청크는 정확히 `overlap_chars` 문자만큼 겹치며,
//! 오버랩을 제거하고 이어 붙이면 원문이 그대로 복원됩니다.
//!
//! 모든 오프셋은 바이트가 아닌 문자(char) 단위입니다.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub max_chunk_chars: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap_chars: usize,
    /// 단어 경계를 찾기 위해 뒤로 살펴보는 거리 (문자 수)
    pub boundary_lookback_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 500,
            overlap_chars: 50,
            boundary_lookback_chars: 40,
        }
    }
}

impl ChunkConfig {
    /// 크기와 오버랩으로 생성 (look-back은 윈도우 크기의 1/4, 최대 40)
    pub fn new(max_chunk_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            overlap_chars,
            boundary_lookback_chars: (max_chunk_chars / 4).min(40),
        }
    }

    /// `0 < overlap_chars < max_chunk_chars`
    pub fn validate(&self) -> Result<()> {
        if self.overlap_chars == 0 {
            return Err(RagError::Validation(
                "overlap_chars must be greater than zero".into(),
            ));
        }
        if self.overlap_chars >= self.max_chunk_chars {
            return Err(RagError::Validation(format!(
                "overlap_chars ({}) must be less than max_chunk_chars ({})",
                self.overlap_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunk Span
// ============================================================================

/// 원문 내 청크 구간
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// 문서 내 순서 (0-based)
    pub sequence_index: usize,
    /// 시작 오프셋 (포함)
    pub char_start: usize,
    /// 끝 오프셋 (제외)
    pub char_end: usize,
    pub text: String,
}

impl ChunkSpan {
    /// 문자 수
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 순서가 있는 청크 구간으로 분할
    fn chunk(&self, text: &str) -> Result<Vec<ChunkSpan>>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SlidingWindowChunker
// ============================================================================

/// 슬라이딩 윈도우 청커
///
/// 윈도우 끝이 단어 중간에 걸리면 look-back 거리 안의 공백 경계로 당기고,
/// 경계가 없으면 정확한 문자 위치에서 자릅니다.
/// 다음 윈도우는 항상 이전 끝에서 `overlap_chars`만큼 앞에서 시작합니다.
pub struct SlidingWindowChunker {
    config: ChunkConfig,
}

impl SlidingWindowChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 단어를 가르지 않는 윈도우 끝 찾기
    ///
    /// 반환값은 항상 `start + overlap_chars`보다 커서 다음 윈도우가 전진합니다.
    fn boundary_before(&self, chars: &[char], start: usize, end: usize) -> usize {
        if chars[end - 1].is_whitespace() || chars[end].is_whitespace() {
            return end;
        }

        let floor = end
            .saturating_sub(self.config.boundary_lookback_chars)
            .max(start + self.config.overlap_chars + 1);

        (floor..end)
            .rev()
            .find(|&k| chars[k - 1].is_whitespace())
            .unwrap_or(end)
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Result<Vec<ChunkSpan>> {
        if text.trim().is_empty() {
            return Err(RagError::Validation("document text is empty".into()));
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            let mut end = (start + self.config.max_chunk_chars).min(total);
            if end < total {
                end = self.boundary_before(&chars, start, end);
            }

            spans.push(ChunkSpan {
                sequence_index: spans.len(),
                char_start: start,
                char_end: end,
                text: chars[start..end].iter().collect(),
            });

            if end >= total {
                break;
            }
            start = end - self.config.overlap_chars;
        }

        Ok(spans)
    }

    fn name(&self) -> &'static str {
        "SlidingWindowChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트를 청크로 분할
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Result<Vec<ChunkSpan>> {
    SlidingWindowChunker::new(config.clone())?.chunk(text)
}

/// 오버랩을 제거하며 청크를 이어 붙여 원문 복원
///
/// `texts`는 `sequence_index` 순서여야 합니다.
pub fn reconstruct<'a, I>(texts: I, overlap_chars: usize) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for (i, text) in texts.into_iter().enumerate() {
        if i == 0 {
            out.push_str(text);
        } else {
            out.extend(text.chars().skip(overlap_chars));
        }
    }
    out
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SlidingWindowChunker {
        config: ChunkConfig::default(),
    })
}

// ============================================================================
// Tests
// ============================================================================
