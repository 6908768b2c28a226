//! Knowledge 모듈 - 근거 기반 RAG 코어
//!
//! - Chunker: 오버랩 슬라이딩 윈도우 분할
//! - VectorStore: 문서 단위 원자적 append + 전체 스캔 (SQLite / 메모리)
//! - Ranker: 코사인 유사도 top-k
//! - Context: 예산 내 컨텍스트 조립 + 인용 마커
//! - Pipeline: ingest / query 오케스트레이션

mod chunker;
mod context;
mod memory;
mod pipeline;
mod ranker;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    chunk_text, default_chunker, reconstruct, ChunkConfig, ChunkSpan, Chunker,
    SlidingWindowChunker,
};
pub use context::{assemble, citation_marker, AssembledContext, CONTEXT_SEPARATOR};
pub use memory::InMemoryVectorStore;
pub use pipeline::{
    IngestReport, QueryOptions, QueryResponse, RagService, SourceChunk, DEFAULT_TITLE,
};
pub use ranker::{rank, rank_required, SimilarityResult};
pub use store::SqliteVectorStore;
pub use vector::{
    cosine_similarity, validate_append, Chunk, Document, DocumentSummary, NewDocument,
    StoreStats, VectorStore,
};
