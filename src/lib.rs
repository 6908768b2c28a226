//! grounded-rag - 로컬 근거 기반 RAG 코어
//!
//! 문서를 청크로 나누어 임베딩과 함께 저장하고,
//! 질문과 가장 유사한 청크를 인용 마커가 붙은 컨텍스트로 조립해
//! 근거 기반 답변을 생성합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
mod gemini;
pub mod generation;
pub mod knowledge;
pub mod retry;

// Re-exports
pub use config::{get_api_key, get_data_dir, EmbeddingBackend, RagConfig};
pub use embedding::{
    create_embedder, EmbeddingAdapter, EmbeddingProvider, EmbeddingTask, GeminiEmbedding,
    MockEmbedding,
};
pub use error::{RagError, Result};
pub use generation::{create_generator, Answer, AnswerGenerator, GeminiGeneration, GenerationProvider};
pub use knowledge::{
    ChunkConfig, Chunk, Document, DocumentSummary, InMemoryVectorStore, IngestReport,
    NewDocument, QueryOptions, QueryResponse, RagService, SimilarityResult, SqliteVectorStore,
    StoreStats, VectorStore,
};
