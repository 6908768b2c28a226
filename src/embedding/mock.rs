//! 오프라인 Mock 임베딩
//!
//! 단어를 해시 버킷에 누적하는 feature hashing 방식입니다.
//! 같은 텍스트는 항상 같은 벡터가 되고, 단어가 많이 겹칠수록 유사도가 높습니다.
//! API 키 없이 로컬 테스트/데모에 사용합니다.
//!
//! 버킷은 FNV-1a 64로 고릅니다. 저장된 벡터는 빌드가 바뀌어도 재현 가능해야 합니다.

use async_trait::async_trait;

use super::{EmbeddingProvider, EmbeddingTask};
use crate::error::Result;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64비트 해시
fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// 해시 기반 결정적 임베딩
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimension: usize,
}

impl MockEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 단일 텍스트 벡터화 (L2 정규화)
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = fnv1a64(word.to_lowercase().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn name(&self) -> &str {
        "mock-hash"
    }
}
