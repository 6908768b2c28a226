//! RagService 통합 테스트 (스텁 프로바이더)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use grounded_rag::generation::NO_GROUNDING_INSTRUCTION;
use grounded_rag::knowledge::{citation_marker, ChunkConfig};
use grounded_rag::{
    EmbeddingProvider, EmbeddingTask, GenerationProvider, InMemoryVectorStore, MockEmbedding,
    NewDocument, QueryOptions, RagConfig, RagError, RagService, Result, SqliteVectorStore,
    VectorStore,
};

// ============================================================================
// Stub providers
// ============================================================================

/// 키워드로 축을 고르는 3차원 임베딩
struct KeywordEmbedding {
    calls: AtomicUsize,
}

impl KeywordEmbedding {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn vector(text: &str) -> Vec<f32> {
        if text.contains("alpha") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("beta") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 한 건짜리 배치만 성공하고 여러 건 배치는 실패
struct SingleOnlyEmbedding;

#[async_trait]
impl EmbeddingProvider for SingleOnlyEmbedding {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if texts.len() > 1 {
            return Err(RagError::embedding("upstream failed mid-batch", false));
        }
        Ok(vec![vec![1.0, 0.0, 0.0]; texts.len()])
    }

    fn name(&self) -> &str {
        "single-only"
    }
}

/// 고정 차원 임베딩
struct FixedDimEmbedding(usize);

#[async_trait]
impl EmbeddingProvider for FixedDimEmbedding {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![0.5; self.0]; texts.len()])
    }

    fn name(&self) -> &str {
        "fixed-dim"
    }
}

/// 첫 호출은 일시적 실패, 이후 성공
struct FlakyEmbedding {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedding {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(RagError::embedding("429 Too Many Requests", true));
        }
        Ok(texts.iter().map(|t| KeywordEmbedding::vector(t)).collect())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// 받은 배치 크기를 기록
struct BatchRecordingEmbedding {
    batch_sizes: Mutex<Vec<usize>>,
}

#[async_trait]
impl EmbeddingProvider for BatchRecordingEmbedding {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        self.batch_sizes.lock().unwrap().push(texts.len());
        Ok(vec![vec![1.0, 0.0]; texts.len()])
    }

    fn name(&self) -> &str {
        "batch-recording"
    }
}

/// 프롬프트를 기록하는 생성 스텁
struct RecordingGeneration {
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl RecordingGeneration {
    fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for RecordingGeneration {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("stub answer".to_string())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> RagConfig {
    RagConfig {
        chunk: ChunkConfig::new(20, 5),
        retry_backoff_ms: 0,
        ..RagConfig::default()
    }
}

fn service_with(
    config: RagConfig,
    store: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingProvider>,
    generation: Arc<dyn GenerationProvider>,
) -> RagService {
    RagService::new(Arc::new(config), store, embedding, generation).unwrap()
}

fn doc(title: &str, text: &str) -> NewDocument {
    NewDocument {
        title: Some(title.to_string()),
        raw_text: text.to_string(),
    }
}

// ============================================================================
// Ingest
// ============================================================================

#[tokio::test]
async fn test_ingest_quick_brown_fox() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let service = service_with(
        test_config(),
        store.clone(),
        KeywordEmbedding::new(),
        RecordingGeneration::new(),
    );

    let text = "The quick brown fox jumps over the lazy dog";
    let report = service.ingest(doc("fox", text)).await.unwrap();
    assert_eq!(report.chunks_created, 3);

    let chunks = store.get(&report.document_id).await.unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts[0], "The quick brown fox ");
    assert!(texts.iter().all(|t| !t.is_empty() && t.chars().count() <= 20));
    assert_eq!(grounded_rag::knowledge::reconstruct(texts, 5), text);

    let indices: Vec<usize> = chunks.iter().map(|c| c.sequence_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_failed_embedding_leaves_no_document() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let service = service_with(
        test_config(),
        store.clone(),
        Arc::new(SingleOnlyEmbedding),
        RecordingGeneration::new(),
    );

    let result = service
        .ingest(doc("long", "The quick brown fox jumps over the lazy dog"))
        .await;
    assert!(matches!(result, Err(RagError::EmbeddingService { .. })));

    assert!(store.scan().await.unwrap().is_empty());
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.document_count, 0);
    assert_eq!(stats.embedding_dim, None);
}

#[tokio::test]
async fn test_dimension_guard_leaves_store_unchanged() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());

    let first = service_with(
        test_config(),
        store.clone(),
        Arc::new(FixedDimEmbedding(3)),
        RecordingGeneration::new(),
    );
    first.ingest(doc("a", "short text")).await.unwrap();
    let before = store.scan().await.unwrap();

    let second = service_with(
        test_config(),
        store.clone(),
        Arc::new(FixedDimEmbedding(4)),
        RecordingGeneration::new(),
    );
    let result = second.ingest(doc("b", "other text")).await;
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 3,
            actual: 4
        })
    ));

    assert_eq!(store.scan().await.unwrap(), before);
    assert_eq!(store.stats().await.unwrap().document_count, 1);
}

#[tokio::test]
async fn test_query_dimension_mismatch_is_fatal() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::with_dimension(3));
    let generation = RecordingGeneration::new();
    let service = service_with(
        test_config(),
        store,
        Arc::new(FixedDimEmbedding(5)),
        generation.clone(),
    );

    let result = service.query("anything", QueryOptions::default()).await;
    assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    assert!(generation.prompts().is_empty());
}

#[tokio::test]
async fn test_long_document_embedded_in_bounded_batches() {
    let embedding = Arc::new(BatchRecordingEmbedding {
        batch_sizes: Mutex::new(Vec::new()),
    });
    let config = RagConfig {
        retry_backoff_ms: 0,
        ..RagConfig::default()
    };
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let service = service_with(config, store.clone(), embedding.clone(), RecordingGeneration::new());

    let report = service
        .ingest(doc("long", &"word ".repeat(12_000)))
        .await
        .unwrap();

    assert!(report.chunks_created > 100);
    let sizes = embedding.batch_sizes.lock().unwrap().clone();
    assert!(sizes.len() > 1);
    assert!(sizes.iter().all(|&n| n <= grounded_rag::embedding::MAX_BATCH_SIZE));
    assert_eq!(sizes.iter().sum::<usize>(), report.chunks_created);

    let chunks = store.get(&report.document_id).await.unwrap();
    assert_eq!(chunks.len(), report.chunks_created);
}

#[tokio::test]
async fn test_transient_embedding_failure_retried() {
    let embedding = Arc::new(FlakyEmbedding {
        calls: AtomicUsize::new(0),
    });
    let service = service_with(
        test_config(),
        Arc::new(InMemoryVectorStore::new()),
        embedding.clone(),
        RecordingGeneration::new(),
    );

    let report = service.ingest(doc("a", "alpha notes")).await.unwrap();
    assert_eq!(report.chunks_created, 1);
    assert_eq!(embedding.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_chunk_size_must_fit_token_limit() {
    let config = RagConfig {
        chunk: ChunkConfig::new(40, 5),
        max_embedding_tokens: 5,
        retry_backoff_ms: 0,
        ..RagConfig::default()
    };
    let embedding = KeywordEmbedding::new();
    let service = RagService::new(
        Arc::new(config),
        Arc::new(InMemoryVectorStore::new()),
        embedding.clone(),
        RecordingGeneration::new(),
    );

    // 40자 청크(~10 토큰)는 5 토큰 한도를 넘으므로 설정 검증에서 거부됩니다.
    assert!(matches!(service, Err(RagError::Config(_))));
    assert_eq!(embedding.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Query
// ============================================================================

#[tokio::test]
async fn test_identical_embedding_ranks_first() {
    let generation = RecordingGeneration::new();
    let service = service_with(
        test_config(),
        Arc::new(InMemoryVectorStore::new()),
        KeywordEmbedding::new(),
        generation.clone(),
    );

    service.ingest(doc("b", "beta facts")).await.unwrap();
    let alpha = service.ingest(doc("a", "alpha facts")).await.unwrap();
    service.ingest(doc("c", "gamma facts")).await.unwrap();

    let response = service
        .query("tell me about alpha", QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(response.answer, "stub answer");
    let top = &response.sources[0];
    assert_eq!(top.document_id, alpha.document_id);
    assert_eq!(top.rank, 1);
    assert!((top.score - 1.0).abs() < 1e-6);
    assert_eq!(response.citations[0], top.chunk_id);

    let prompt = &generation.prompts()[0];
    assert!(prompt.contains(&citation_marker(&top.chunk_id)));
    assert!(prompt.contains("Question: tell me about alpha"));
}

#[tokio::test]
async fn test_threshold_and_top_k_limit_citations() {
    let service = service_with(
        test_config(),
        Arc::new(InMemoryVectorStore::new()),
        KeywordEmbedding::new(),
        RecordingGeneration::new(),
    );
    service.ingest(doc("a", "alpha one")).await.unwrap();
    service.ingest(doc("b", "beta two")).await.unwrap();
    service.ingest(doc("c", "gamma three")).await.unwrap();

    let strict = QueryOptions {
        score_threshold: Some(0.5),
        ..Default::default()
    };
    let response = service.query("alpha", strict).await.unwrap();
    assert_eq!(response.citations.len(), 1);

    let one = QueryOptions {
        top_k: Some(1),
        ..Default::default()
    };
    let response = service.query("beta", one).await.unwrap();
    assert_eq!(response.citations.len(), 1);
    assert!(response.sources[0].text.contains("beta"));
}

#[tokio::test]
async fn test_empty_corpus_returns_ungrounded_answer() {
    let generation = RecordingGeneration::new();
    let service = service_with(
        test_config(),
        Arc::new(InMemoryVectorStore::new()),
        KeywordEmbedding::new(),
        generation.clone(),
    );

    let response = service.query("alpha?", QueryOptions::default()).await.unwrap();
    assert!(response.citations.is_empty());
    assert!(response.sources.is_empty());
    assert_eq!(generation.prompts().len(), 1);
    assert!(generation.prompts()[0].contains(NO_GROUNDING_INSTRUCTION));
}

#[tokio::test]
async fn test_empty_corpus_must_match_is_not_found() {
    let generation = RecordingGeneration::new();
    let service = service_with(
        test_config(),
        Arc::new(InMemoryVectorStore::new()),
        KeywordEmbedding::new(),
        generation.clone(),
    );

    let options = QueryOptions {
        require_match: true,
        ..Default::default()
    };
    let result = service.query("alpha?", options).await;
    assert!(matches!(result, Err(RagError::NotFound(_))));
    assert!(generation.prompts().is_empty());
}

#[tokio::test]
async fn test_context_budget_limits_citations() {
    let config = RagConfig {
        max_context_chars: 80,
        ..test_config()
    };
    let service = service_with(
        config,
        Arc::new(InMemoryVectorStore::new()),
        KeywordEmbedding::new(),
        RecordingGeneration::new(),
    );
    service.ingest(doc("a", "alpha one")).await.unwrap();
    service.ingest(doc("b", "alpha two")).await.unwrap();

    // 두 청크 모두 임계값을 통과하지만 예산에는 하나만 들어갑니다.
    let response = service.query("alpha", QueryOptions::default()).await.unwrap();
    assert_eq!(response.citations.len(), 1);
}

#[tokio::test]
async fn test_scoped_query_only_searches_document() {
    let service = service_with(
        test_config(),
        Arc::new(InMemoryVectorStore::new()),
        KeywordEmbedding::new(),
        RecordingGeneration::new(),
    );
    service.ingest(doc("a", "alpha one")).await.unwrap();
    let beta = service.ingest(doc("b", "beta two")).await.unwrap();

    let options = QueryOptions {
        document_id: Some(beta.document_id.clone()),
        ..Default::default()
    };
    let response = service.query("alpha", options).await.unwrap();
    assert!(response
        .sources
        .iter()
        .all(|s| s.document_id == beta.document_id));
}

#[tokio::test]
async fn test_query_deadline_cancels_generation() {
    let config = RagConfig {
        query_timeout_secs: 1,
        ..test_config()
    };
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let service = service_with(
        config,
        store.clone(),
        KeywordEmbedding::new(),
        RecordingGeneration::with_delay(Duration::from_secs(10)),
    );
    service.ingest(doc("a", "alpha one")).await.unwrap();
    let before = store.scan().await.unwrap();

    let result = service.query("alpha", QueryOptions::default()).await;
    assert!(matches!(
        result,
        Err(RagError::GenerationService {
            transient: false,
            ..
        })
    ));
    assert_eq!(store.scan().await.unwrap(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_and_ingests() {
    let service = Arc::new(service_with(
        test_config(),
        Arc::new(InMemoryVectorStore::new()),
        KeywordEmbedding::new(),
        RecordingGeneration::new(),
    ));
    service.ingest(doc("a", "alpha seed")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service
                    .ingest(doc("b", &format!("beta note {}", i)))
                    .await
                    .map(|_| ())
            } else {
                service
                    .query("alpha", QueryOptions::default())
                    .await
                    .map(|r| assert!(!r.citations.is_empty()))
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.document_count, 5);
    for chunk in service.store().scan().await.unwrap() {
        assert_eq!(chunk.embedding.len(), 3);
    }
}

// ============================================================================
// Document management
// ============================================================================

#[tokio::test]
async fn test_delete_document_removes_chunks() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let service = service_with(
        test_config(),
        store.clone(),
        KeywordEmbedding::new(),
        RecordingGeneration::new(),
    );
    let report = service
        .ingest(doc("fox", "The quick brown fox jumps over the lazy dog"))
        .await
        .unwrap();
    let keep = service.ingest(doc("a", "alpha")).await.unwrap();

    service.delete_document(&report.document_id).await.unwrap();

    assert!(store.get(&report.document_id).await.unwrap().is_empty());
    assert!(matches!(
        service.get_document(&report.document_id).await,
        Err(RagError::NotFound(_))
    ));
    assert_eq!(store.scan().await.unwrap().len(), 1);

    let docs = service.list_documents(10).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, keep.document_id);
}

#[tokio::test]
async fn test_sqlite_end_to_end_with_mock_embedding() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("knowledge.db");
    let config = RagConfig {
        embedding_dim: 64,
        retry_backoff_ms: 0,
        ..RagConfig::default()
    };

    let document_id = {
        let store = Arc::new(SqliteVectorStore::open(&db_path).unwrap());
        let service = service_with(
            config.clone(),
            store,
            Arc::new(MockEmbedding::new(64)),
            RecordingGeneration::new(),
        );
        service
            .ingest(doc("rust", "Ownership and borrowing keep Rust memory safe."))
            .await
            .unwrap();
        service
            .ingest(doc("fruit", "Bananas and mangoes grow in tropical climates."))
            .await
            .unwrap()
            .document_id
    };

    let store = Arc::new(SqliteVectorStore::open(&db_path).unwrap());
    let service = service_with(
        config,
        store,
        Arc::new(MockEmbedding::new(64)),
        RecordingGeneration::new(),
    );

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.embedding_dim, Some(64));

    let response = service
        .query("where do mangoes grow", QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(response.sources[0].document_id, document_id);
}
