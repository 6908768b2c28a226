//! CLI 모듈
//!
//! grounded-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::RagConfig;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::knowledge::{NewDocument, QueryOptions, RagService, SqliteVectorStore, VectorStore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "grounded-rag")]
#[command(version, about = "로컬 근거 기반 RAG 도구", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 텍스트 또는 파일을 지식베이스에 추가
    Ingest {
        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 수집할 텍스트 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 문서 제목 (기본: 파일 이름 또는 "Untitled")
        #[arg(long)]
        title: Option<String>,
    },

    /// 질문에 근거 기반으로 답변
    Query {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 최소 유사도 (-1.0 ~ 1.0)
        #[arg(long)]
        threshold: Option<f32>,

        /// 특정 문서로 검색 범위 제한
        #[arg(short, long)]
        document: Option<String>,

        /// 일치하는 청크가 없으면 실패
        #[arg(long)]
        must_match: bool,
    },

    /// 저장된 문서 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서와 청크 보기
    Show {
        /// 문서 ID
        id: String,
    },

    /// 문서 삭제 (모든 청크 포함)
    Delete {
        /// 삭제할 문서 ID
        id: String,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest { text, file, title } => cmd_ingest(config, text, file, title).await,
        Commands::Query {
            question,
            top_k,
            threshold,
            document,
            must_match,
        } => {
            let options = QueryOptions {
                top_k,
                score_threshold: threshold,
                document_id: document,
                require_match: must_match,
            };
            cmd_query(config, &question, options).await
        }
        Commands::List { limit } => cmd_list(config, limit).await,
        Commands::Show { id } => cmd_show(config, &id).await,
        Commands::Delete { id } => cmd_delete(config, &id).await,
        Commands::Status => cmd_status(config).await,
    }
}

/// 저장소 열기
fn open_store(config: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    let store = SqliteVectorStore::open(&config.db_path()).context("저장소 열기 실패")?;
    Ok(Arc::new(store))
}

/// 임베딩/생성 프로바이더까지 갖춘 서비스 생성
fn open_service(config: RagConfig) -> Result<RagService> {
    let store = open_store(&config)?;
    let embedding = create_embedder(&config).context("임베딩 프로바이더 생성 실패")?;
    let generation = create_generator(&config).context("생성 프로바이더 생성 실패")?;

    RagService::new(Arc::new(config), store, embedding, generation)
        .context("RagService 초기화 실패")
}

/// 문서 관리 전용 서비스 (API 키 불필요)
fn open_catalog(config: RagConfig) -> Result<RagService> {
    let store = open_store(&config)?;
    RagService::store_only(Arc::new(config), store).context("RagService 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    config: RagConfig,
    text: Option<String>,
    file: Option<PathBuf>,
    title: Option<String>,
) -> Result<()> {
    let (raw_text, title) = if let Some(ref path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
        let title = title.or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_string())
        });
        (content, title)
    } else if let Some(text_content) = text {
        (text_content, title)
    } else {
        bail!("--text, --file 중 하나를 지정해야 합니다");
    };

    let service = open_service(config)?;

    println!("[*] 청킹 및 임베딩 생성 중... ({} chars)", raw_text.chars().count());

    let report = service
        .ingest(NewDocument { title, raw_text })
        .await
        .context("문서 추가 실패")?;

    println!("[OK] 문서가 추가되었습니다 (ID: {})", report.document_id);
    println!("     청크: {} 개", report.chunks_created);

    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(config: RagConfig, question: &str, options: QueryOptions) -> Result<()> {
    let service = open_service(config)?;

    println!("[*] 질의 중: \"{}\"", question);

    let response = service.query(question, options).await.context("질의 실패")?;

    println!("\n[OK] 답변:\n");
    println!("{}", response.answer);

    if response.sources.is_empty() {
        println!("\n[!] 근거로 사용된 문서가 없습니다.");
        return Ok(());
    }

    println!("\n[*] 출처 ({} 건):\n", response.sources.len());
    for source in &response.sources {
        println!(
            "{}. [점수: {:.4}] [chunk:{}]",
            source.rank, source.score, source.chunk_id
        );
        println!(
            "   문서: {} (#{})",
            source.document_id, source.sequence_index
        );
        println!("   내용: {}", truncate_text(&source.text, 200));
        println!();
    }

    Ok(())
}

/// 목록 명령어 (list)
async fn cmd_list(config: RagConfig, limit: usize) -> Result<()> {
    let service = open_catalog(config)?;

    let docs = service
        .list_documents(limit)
        .await
        .context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        println!("  {} {}", doc.id, truncate_text(&doc.title, 40));
        println!(
            "        {} | {} chunks",
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.chunk_count
        );
        println!();
    }

    Ok(())
}

/// 문서 보기 명령어 (show)
async fn cmd_show(config: RagConfig, id: &str) -> Result<()> {
    let service = open_catalog(config)?;

    let (doc, chunks) = service
        .get_document(id)
        .await
        .with_context(|| format!("문서 조회 실패: {}", id))?;

    println!("[OK] {} ({})", doc.title, doc.id);
    println!(
        "     {} | {} chars | {} chunks",
        doc.created_at.format("%Y-%m-%d %H:%M"),
        doc.raw_text.chars().count(),
        chunks.len()
    );
    println!();

    for chunk in chunks {
        println!(
            "  #{:<3} [{}..{}] {}",
            chunk.sequence_index,
            chunk.char_start,
            chunk.char_end,
            truncate_text(&chunk.text, 80)
        );
    }

    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(config: RagConfig, id: &str) -> Result<()> {
    let service = open_catalog(config)?;

    service
        .delete_document(id)
        .await
        .with_context(|| format!("문서 삭제 실패: {}", id))?;

    println!("[OK] 문서 {} 삭제됨", id);
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: RagConfig) -> Result<()> {
    println!("grounded-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 임베딩: {:?} ({}, dim={})",
        config.embedding_backend, config.embedding_model, config.embedding_dim
    );
    println!("[*] 생성 모델: {}", config.generation_model);

    if config.api_key.is_some() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match open_catalog(config) {
        Ok(service) => match service.stats().await {
            Ok(stats) => {
                println!("[OK] 저장된 문서: {} 건", stats.document_count);
                println!("     청크: {} 개", stats.chunk_count);
                match stats.embedding_dim {
                    Some(dim) => println!("     임베딩 차원: {}", dim),
                    None => println!("     임베딩 차원: 미확정"),
                }
            }
            Err(e) => {
                println!("[!] 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            println!("[!] {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 공백을 한 칸으로 접고 max_chars 글자에서 자르기
fn truncate_text(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}

// ============================================================================
// Tests
// ============================================================================
