//! grounded-rag CLI 진입점

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// RUST_LOG 미설정 시 필터
const DEFAULT_LOG_FILTER: &str = "grounded_rag=info,warn";

fn main() -> Result<()> {
    // 로그는 stderr, 명령 결과는 stdout
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = grounded_rag::cli::Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(grounded_rag::cli::run(cli))
}
