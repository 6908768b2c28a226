//! In-Memory Vector Store
//!
//! `tokio::sync::RwLock`으로 보호되는 메모리 저장소입니다.
//! append는 쓰기 락 안에서 한 번에 커밋되므로 scan은 항상 일관된 스냅샷을 봅니다.
//! 개발/테스트 및 소규모 코퍼스용입니다.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector::{
    validate_append, Chunk, Document, DocumentSummary, StoreStats, VectorStore,
};
use crate::error::{RagError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<String, Document>,
    /// document_id -> sequence_index 순 청크
    chunks: HashMap<String, Vec<Chunk>>,
    dimension: Option<usize>,
}

/// 메모리 벡터 저장소
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    state: RwLock<MemoryState>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 임베딩 차원을 미리 고정하여 생성
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                dimension: Some(dimension),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn append(&self, document: &Document, chunks: &[Chunk]) -> Result<()> {
        let mut state = self.state.write().await;

        if state.documents.contains_key(&document.id) {
            return Err(RagError::Storage(format!(
                "document {} already exists",
                document.id
            )));
        }

        let dim = validate_append(document, chunks, state.dimension)?;

        state.documents.insert(document.id.clone(), document.clone());
        state.chunks.insert(document.id.clone(), chunks.to_vec());
        state.dimension.get_or_insert(dim);

        tracing::debug!(
            "Appended document {} ({} chunks, dim={})",
            document.id,
            chunks.len(),
            dim
        );
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Chunk>> {
        let state = self.state.read().await;
        Ok(state.chunks.values().flatten().cloned().collect())
    }

    async fn get(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let state = self.state.read().await;
        Ok(state.chunks.get(document_id).cloned().unwrap_or_default())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state.documents.get(document_id).cloned())
    }

    async fn list_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let state = self.state.read().await;

        let mut docs: Vec<DocumentSummary> = state
            .documents
            .values()
            .map(|d| DocumentSummary {
                id: d.id.clone(),
                title: d.title.clone(),
                created_at: d.created_at,
                chunk_count: state.chunks.get(&d.id).map_or(0, Vec::len),
            })
            .collect();

        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.chunks.remove(document_id);
        Ok(state.documents.remove(document_id).is_some())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.read().await.dimension)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.read().await;
        Ok(StoreStats {
            document_count: state.documents.len(),
            chunk_count: state.chunks.values().map(Vec::len).sum(),
            embedding_dim: state.dimension,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::tests::{sample_chunk, sample_document};

    #[tokio::test]
    async fn test_append_and_get_in_order() {
        let store = InMemoryVectorStore::new();
        let doc = sample_document("d1");
        let chunks = vec![
            sample_chunk("d1", 0, vec![1.0, 0.0]),
            sample_chunk("d1", 1, vec![0.0, 1.0]),
        ];

        store.append(&doc, &chunks).await.unwrap();

        let got = store.get("d1").await.unwrap();
        assert_eq!(got, chunks);
        assert_eq!(store.dimension().await.unwrap(), Some(2));
        assert_eq!(store.scan().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_leaves_store_unchanged() {
        let store = InMemoryVectorStore::new();
        store
            .append(&sample_document("d1"), &[sample_chunk("d1", 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        let result = store
            .append(&sample_document("d2"), &[sample_chunk("d2", 0, vec![1.0, 0.0, 0.0])])
            .await;

        assert!(matches!(result, Err(RagError::DimensionMismatch { expected: 2, actual: 3 })));
        assert!(store.get_document("d2").await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_preset_dimension() {
        let store = InMemoryVectorStore::with_dimension(4);
        let result = store
            .append(&sample_document("d1"), &[sample_chunk("d1", 0, vec![1.0])])
            .await;
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_document_rejected() {
        let store = InMemoryVectorStore::new();
        let doc = sample_document("d1");
        let chunks = vec![sample_chunk("d1", 0, vec![1.0])];
        store.append(&doc, &chunks).await.unwrap();
        assert!(matches!(store.append(&doc, &chunks).await, Err(RagError::Storage(_))));
        assert_eq!(store.get("d1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_document_removes_all_chunks() {
        let store = InMemoryVectorStore::new();
        store
            .append(
                &sample_document("d1"),
                &[sample_chunk("d1", 0, vec![1.0]), sample_chunk("d1", 1, vec![0.5])],
            )
            .await
            .unwrap();
        store
            .append(&sample_document("d2"), &[sample_chunk("d2", 0, vec![1.0])])
            .await
            .unwrap();

        assert!(store.delete_document("d1").await.unwrap());
        assert!(!store.delete_document("d1").await.unwrap());

        let remaining = store.scan().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].document_id, "d2");
        assert!(store.get("d1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_documents_with_chunk_counts() {
        let store = InMemoryVectorStore::new();
        for id in ["a", "b", "c"] {
            store
                .append(&sample_document(id), &[sample_chunk(id, 0, vec![1.0])])
                .await
                .unwrap();
        }

        let list = store.list_documents(2).await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|d| d.chunk_count == 1));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.document_count, 3);
        assert_eq!(stats.embedding_dim, Some(1));
    }
}
