//! 단일 재시도 헬퍼
//!
//! 외부 호출이 일시적 실패(`RagError::is_transient`)를 반환하면
//! 백오프 후 정확히 한 번 더 시도합니다. 두 번째 실패는 그대로 전달됩니다.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// 첫 시도 이후 최대 재시도 횟수
pub const MAX_RETRIES: u32 = 1;

/// 일시적 실패 시 한 번 재시도
pub async fn retry_once<T, F, Fut>(label: &str, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                attempt += 1;
                tracing::warn!(
                    "{} failed ({}), retrying in {:?} (attempt {}/{})",
                    label,
                    e,
                    backoff,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
