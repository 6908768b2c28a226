//! RAG Pipeline - 수집(ingest)과 질의(query) 오케스트레이션
//!
//! - ingest: 청킹 → 배치 임베딩 → 문서 단위 원자적 append
//! - query: 질문 임베딩 → 전체 스캔 랭킹 → 컨텍스트 조립 → 답변 생성
//!
//! 중간 상태는 어디에도 저장하지 않습니다. 어느 단계든 실패하면
//! 전체 작업이 중단되고 저장소는 변경되지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use super::chunker::{Chunker, SlidingWindowChunker};
use super::context::assemble;
use super::ranker::{rank, rank_required, SimilarityResult};
use super::vector::{Chunk, Document, DocumentSummary, NewDocument, StoreStats, VectorStore};
use crate::config::RagConfig;
use crate::embedding::{EmbeddingAdapter, EmbeddingProvider, EmbeddingTask};
use crate::error::{RagError, Result};
use crate::generation::{AnswerGenerator, GenerationProvider};

/// 제목이 없을 때 사용하는 기본 제목
pub const DEFAULT_TITLE: &str = "Untitled";

// ============================================================================
// Types
// ============================================================================

/// 수집 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_created: usize,
}

/// 질의 옵션 (None이면 설정 기본값)
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
    /// 특정 문서로 검색 범위 제한
    pub document_id: Option<String>,
    /// 검색 대상이 비어 있으면 NotFound
    pub require_match: bool,
}

/// 인용된 청크 정보
#[derive(Debug, Clone, Serialize)]
pub struct SourceChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub sequence_index: usize,
    pub score: f32,
    pub rank: usize,
    pub text: String,
}

/// 질의 응답
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    /// 컨텍스트에 포함된 청크 ID (랭킹 순)
    pub citations: Vec<String>,
    pub sources: Vec<SourceChunk>,
}

// ============================================================================
// RagService
// ============================================================================

/// RAG 서비스
///
/// 설정과 저장소는 `Arc`로 공유되며, 여러 질의를 동시에 처리할 수 있습니다.
/// `store_only`로 만든 서비스는 문서 관리만 가능하고 ingest/query는 `Config` 에러입니다.
pub struct RagService {
    config: Arc<RagConfig>,
    store: Arc<dyn VectorStore>,
    embedder: Option<EmbeddingAdapter>,
    generator: Option<AnswerGenerator>,
    chunker: SlidingWindowChunker,
}

impl RagService {
    /// 새 서비스 생성
    pub fn new(
        config: Arc<RagConfig>,
        store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingProvider>,
        generation: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = SlidingWindowChunker::new(config.chunk.clone())?;
        let embedder = EmbeddingAdapter::new(embedding, &config);
        let generator = AnswerGenerator::new(generation, &config);

        Ok(Self {
            config,
            store,
            embedder: Some(embedder),
            generator: Some(generator),
            chunker,
        })
    }

    /// 프로바이더 없이 문서 관리 전용 서비스 생성
    pub fn store_only(config: Arc<RagConfig>, store: Arc<dyn VectorStore>) -> Result<Self> {
        config.validate()?;
        let chunker = SlidingWindowChunker::new(config.chunk.clone())?;

        Ok(Self {
            config,
            store,
            embedder: None,
            generator: None,
            chunker,
        })
    }

    fn embedder(&self) -> Result<&EmbeddingAdapter> {
        self.embedder
            .as_ref()
            .ok_or_else(|| RagError::Config("no embedding provider configured".into()))
    }

    fn generator(&self) -> Result<&AnswerGenerator> {
        self.generator
            .as_ref()
            .ok_or_else(|| RagError::Config("no generation provider configured".into()))
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// 문서 수집
    ///
    /// 모든 청크가 임베딩된 뒤에만 저장소에 쓰므로,
    /// 실패 시 문서도 청크도 남지 않습니다.
    pub async fn ingest(&self, doc: NewDocument) -> Result<IngestReport> {
        let embedder = self.embedder()?;
        if doc.raw_text.trim().is_empty() {
            return Err(RagError::Validation("document text is empty".into()));
        }

        let title = doc
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();

        // 1. 청킹
        let spans = self.chunker.chunk(&doc.raw_text)?;
        tracing::debug!("Chunked '{}' into {} spans", title, spans.len());

        // 2. 배치 임베딩
        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let vectors = embedder.embed(&texts, EmbeddingTask::Document).await?;

        if let (Some(expected), Some(first)) = (self.store.dimension().await?, vectors.first()) {
            if first.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: first.len(),
                });
            }
        }

        // 3. 레코드 생성
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            title,
            raw_text: doc.raw_text,
            created_at: now,
        };

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .zip(vectors)
            .map(|(span, embedding)| Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                sequence_index: span.sequence_index,
                text: span.text,
                char_start: span.char_start,
                char_end: span.char_end,
                embedding,
                created_at: now,
            })
            .collect();

        // 4. 원자적 append
        self.store.append(&document, &chunks).await?;

        tracing::info!(
            "Ingested document: {} (id={}, chunks={})",
            document.title,
            document.id,
            chunks.len()
        );

        Ok(IngestReport {
            document_id: document.id,
            chunks_created: chunks.len(),
        })
    }

    /// 제목과 본문으로 수집
    pub async fn ingest_text(&self, title: &str, raw_text: &str) -> Result<IngestReport> {
        self.ingest(NewDocument {
            title: Some(title.to_string()),
            raw_text: raw_text.to_string(),
        })
        .await
    }

    /// 질의
    ///
    /// 전체 과정은 `query_timeout` 데드라인 안에서 수행됩니다.
    /// 일치하는 청크가 없으면 근거 없음 답변을 반환합니다 (`require_match` 제외).
    pub async fn query(&self, question: &str, options: QueryOptions) -> Result<QueryResponse> {
        let deadline = Instant::now() + self.config.query_timeout();
        let embedder = self.embedder()?;
        let generator = self.generator()?;

        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question is empty".into()));
        }
        let top_k = options.top_k.unwrap_or(self.config.top_k);
        if top_k == 0 {
            return Err(RagError::Validation("top_k must be greater than zero".into()));
        }
        let score_threshold = options
            .score_threshold
            .unwrap_or(self.config.score_threshold);
        if !(-1.0..=1.0).contains(&score_threshold) {
            return Err(RagError::Validation(format!(
                "score_threshold ({}) must be within [-1, 1]",
                score_threshold
            )));
        }

        // 1. 질문 임베딩
        let query_vector = timeout_at(
            deadline,
            embedder.embed_one(question, EmbeddingTask::Query),
        )
        .await
        .map_err(|_| RagError::embedding("query deadline exceeded while embedding", false))??;

        if let Some(expected) = self.store.dimension().await? {
            if query_vector.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query_vector.len(),
                });
            }
        }

        // 2. 검색 대상 스냅샷
        let corpus = match options.document_id.as_deref() {
            Some(document_id) => {
                if self.store.get_document(document_id).await?.is_none() {
                    return Err(RagError::NotFound(format!("document {}", document_id)));
                }
                self.store.get(document_id).await?
            }
            None => self.store.scan().await?,
        };

        // 3. 랭킹
        let ranked = if options.require_match {
            rank_required(&query_vector, &corpus, top_k, score_threshold)?
        } else {
            rank(&query_vector, &corpus, top_k, score_threshold)
        };
        tracing::debug!(
            "Ranked {} of {} chunks (top_k={}, threshold={})",
            ranked.len(),
            corpus.len(),
            top_k,
            score_threshold
        );

        // 4. 컨텍스트 조립
        let lookup: HashMap<&str, &Chunk> = corpus.iter().map(|c| (c.id.as_str(), c)).collect();
        let context = assemble(&ranked, &lookup, self.config.max_context_chars);

        // 5. 답변 생성
        let answer = timeout_at(
            deadline,
            generator.answer(question, &context.text, &context.citations),
        )
        .await
        .map_err(|_| RagError::generation("query deadline exceeded while generating", false))??;

        let sources = collect_sources(&ranked, &lookup, &answer.citations);

        tracing::info!(
            "Answered query (citations={}, grounded={})",
            answer.citations.len(),
            !context.is_empty()
        );

        Ok(QueryResponse {
            answer: answer.text,
            citations: answer.citations,
            sources,
        })
    }

    // ========================================================================
    // Document management
    // ========================================================================

    /// 문서 목록 (최신순)
    pub async fn list_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        self.store.list_documents(limit).await
    }

    /// 문서와 순서대로 정렬된 청크 조회
    pub async fn get_document(&self, document_id: &str) -> Result<(Document, Vec<Chunk>)> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document {}", document_id)))?;
        let chunks = self.store.get(document_id).await?;
        Ok((document, chunks))
    }

    /// 문서 삭제 (모든 청크 포함)
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        if !self.store.delete_document(document_id).await? {
            return Err(RagError::NotFound(format!("document {}", document_id)));
        }
        tracing::info!("Deleted document: {}", document_id);
        Ok(())
    }

    /// 저장소 통계
    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }
}

/// 인용된 청크만 랭킹 정보와 함께 추출
fn collect_sources(
    ranked: &[SimilarityResult],
    lookup: &HashMap<&str, &Chunk>,
    citations: &[String],
) -> Vec<SourceChunk> {
    citations
        .iter()
        .filter_map(|id| {
            let result = ranked.iter().find(|r| &r.chunk_id == id)?;
            let chunk = lookup.get(id.as_str())?;
            Some(SourceChunk {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                sequence_index: chunk.sequence_index,
                score: result.score,
                rank: result.rank,
                text: chunk.text.clone(),
            })
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
