//! SQLite Vector Store - rusqlite 기반 영속 저장소
//!
//! 문서와 청크(임베딩 포함)를 하나의 SQLite 파일에 저장합니다.
//! 저장 위치: ~/.grounded-rag/knowledge.db
//!
//! - append: 단일 트랜잭션 (전부 커밋되거나 전부 롤백)
//! - scan: 단일 SELECT (커넥션 락 안에서 일관된 스냅샷)
//! - 임베딩: little-endian f32 BLOB

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use super::vector::{
    validate_append, Chunk, Document, DocumentSummary, StoreStats, VectorStore,
};
use crate::error::{RagError, Result};

/// store_meta 테이블의 임베딩 차원 키
const META_EMBEDDING_DIM: &str = "embedding_dim";

const CHUNK_COLUMNS: &str =
    "id, document_id, sequence_index, text, char_start, char_end, embedding, created_at";

// ============================================================================
// SqliteVectorStore
// ============================================================================

/// SQLite 벡터 저장소
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RagError::Storage(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::from_connection(conn, path.to_path_buf())
    }

    /// 메모리 DB로 열기
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        };
        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::Storage(format!("Lock error: {}", e)))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                sequence_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (document_id, sequence_index)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        tracing::debug!("Vector store initialized at {:?}", self.db_path);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn append(&self, document: &Document, chunks: &[Chunk]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM documents WHERE id = ?1",
                params![document.id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if exists {
            return Err(RagError::Storage(format!(
                "document {} already exists",
                document.id
            )));
        }

        let established = read_dimension(&tx)?;
        let dim = validate_append(document, chunks, established)?;

        tx.execute(
            "INSERT INTO documents (id, title, raw_text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                document.id,
                document.title,
                document.raw_text,
                document.created_at.to_rfc3339()
            ],
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO chunks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                CHUNK_COLUMNS
            ))?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    chunk.document_id,
                    chunk.sequence_index as i64,
                    chunk.text,
                    chunk.char_start as i64,
                    chunk.char_end as i64,
                    serialize_vector(&chunk.embedding),
                    chunk.created_at.to_rfc3339(),
                ])?;
            }
        }

        if established.is_none() {
            tx.execute(
                "INSERT INTO store_meta (key, value) VALUES (?1, ?2)",
                params![META_EMBEDDING_DIM, dim.to_string()],
            )?;
        }

        tx.commit()?;

        tracing::debug!(
            "Appended document {} ({} chunks, dim={})",
            document.id,
            chunks.len(),
            dim
        );
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Chunk>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks ORDER BY document_id, sequence_index",
            CHUNK_COLUMNS
        ))?;

        let chunks = stmt
            .query_map([], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    async fn get(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks WHERE document_id = ?1 ORDER BY sequence_index",
            CHUNK_COLUMNS
        ))?;

        let chunks = stmt
            .query_map(params![document_id], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let conn = self.lock()?;

        let doc = conn
            .query_row(
                "SELECT id, title, raw_text, created_at FROM documents WHERE id = ?1",
                params![document_id],
                |row| {
                    Ok(Document {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        raw_text: row.get(2)?,
                        created_at: parse_datetime(row, 3)?,
                    })
                },
            )
            .optional()?;

        Ok(doc)
    }

    async fn list_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT d.id, d.title, d.created_at, COUNT(c.id)
             FROM documents d
             LEFT JOIN chunks c ON c.document_id = d.id
             GROUP BY d.id
             ORDER BY d.created_at DESC, d.id
             LIMIT ?1",
        )?;

        let docs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(DocumentSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: parse_datetime(row, 2)?,
                    chunk_count: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chunks WHERE document_id = ?1", params![document_id])?;
        let rows = tx.execute("DELETE FROM documents WHERE id = ?1", params![document_id])?;
        tx.commit()?;

        Ok(rows > 0)
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        let conn = self.lock()?;
        read_dimension(&conn)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let document_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let chunk_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        Ok(StoreStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            embedding_dim: read_dimension(&conn)?,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_dimension(conn: &Connection) -> Result<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![META_EMBEDDING_DIM],
            |row| row.get(0),
        )
        .optional()?;

    value
        .map(|v| {
            v.parse::<usize>()
                .map_err(|e| RagError::Storage(format!("Corrupt embedding_dim '{}': {}", v, e)))
        })
        .transpose()
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        sequence_index: row.get::<_, i64>(2)? as usize,
        text: row.get(3)?,
        char_start: row.get::<_, i64>(4)? as usize,
        char_end: row.get::<_, i64>(5)? as usize,
        embedding: deserialize_vector(&row.get::<_, Vec<u8>>(6)?),
        created_at: parse_datetime(row, 7)?,
    })
}

/// f32 벡터 -> little-endian 바이트
fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// little-endian 바이트 -> f32 벡터
fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// RFC3339 컬럼을 DateTime<Utc>로 파싱 (손상된 값은 변환 에러)
fn parse_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ============================================================================
// Tests
// ============================================================================
