//! 엔드포인트별 요청 한도 관리.
//!
//! (엔드포인트, 자격증명 키)마다 토큰 버킷을 유지합니다. 토큰이 없으면
//! 버킷이 리셋될 때까지 대기하며, 대기 중 취소 신호가 오면
//! `ExchangeError::Cancelled`를 반환합니다. 한 자격증명의 대기가 다른
//! 자격증명의 요청을 막지 않습니다.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ExchangeError, ExchangeResult};

/// 윈도우당 허용 요청 수.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub capacity: u32,
    pub window: Duration,
}

impl Quota {
    pub const fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window }
    }

    pub const fn per_second(capacity: u32) -> Self {
        Self::new(capacity, Duration::from_secs(1))
    }

    pub const fn per_minute(capacity: u32) -> Self {
        Self::new(capacity, Duration::from_secs(60))
    }
}

/// 엔드포인트 → 한도 테이블. 등록되지 않은 엔드포인트는 기본 한도를 씁니다.
#[derive(Debug, Clone)]
pub struct QuotaTable {
    default: Quota,
    endpoints: HashMap<&'static str, Quota>,
}

impl QuotaTable {
    pub fn new(default: Quota) -> Self {
        Self {
            default,
            endpoints: HashMap::new(),
        }
    }

    pub fn with(mut self, endpoint: &'static str, quota: Quota) -> Self {
        self.endpoints.insert(endpoint, quota);
        self
    }

    pub fn quota_for(&self, endpoint: &str) -> Quota {
        self.endpoints.get(endpoint).copied().unwrap_or(self.default)
    }
}

#[derive(Debug)]
struct Bucket {
    remaining: u32,
    reset_at: Instant,
    last_used: Instant,
}

impl Bucket {
    fn new(quota: Quota, now: Instant) -> Self {
        Self {
            remaining: quota.capacity,
            reset_at: now + quota.window,
            last_used: now,
        }
    }

    /// 토큰 소비. 실패하면 리셋까지 남은 시간을 반환합니다.
    fn try_take(&mut self, quota: Quota, now: Instant) -> Result<(), Duration> {
        if now >= self.reset_at {
            self.remaining = quota.capacity;
            self.reset_at = now + quota.window;
        }
        self.last_used = now;

        if self.remaining > 0 {
            self.remaining -= 1;
            Ok(())
        } else {
            Err(self.reset_at.saturating_duration_since(now))
        }
    }
}

type BucketKey = (String, String);

/// 어댑터 인스턴스별 요청 한도 관리자.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 토큰 하나를 얻을 때까지 대기합니다.
    pub async fn acquire(
        &self,
        endpoint: &str,
        credential_key: &str,
        quota: Quota,
        cancel: &CancellationToken,
    ) -> ExchangeResult<()> {
        if quota.capacity == 0 {
            return Err(ExchangeError::RateLimited(format!(
                "{} 한도가 0으로 설정됨",
                endpoint
            )));
        }

        loop {
            if cancel.is_cancelled() {
                return Err(ExchangeError::Cancelled);
            }

            let wait = {
                let mut buckets = self.buckets.lock().await;
                let now = Instant::now();
                let bucket = buckets
                    .entry((endpoint.to_string(), credential_key.to_string()))
                    .or_insert_with(|| Bucket::new(quota, now));

                match bucket.try_take(quota, now) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            debug!(endpoint, wait_ms = wait.as_millis() as u64, "요청 한도 소진, 리셋까지 대기");

            tokio::select! {
                _ = cancel.cancelled() => return Err(ExchangeError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// `idle` 동안 사용되지 않은 버킷 정리.
    pub async fn cleanup(&self, idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_used) < idle);
        before - buckets.len()
    }

    /// 현재 추적 중인 버킷 수.
    pub async fn tracked_buckets(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_reset() {
        let limiter = RateLimiter::new();
        let cancel = CancellationToken::new();
        let quota = Quota::per_second(2);

        let start = Instant::now();
        limiter.acquire("/a", "k", quota, &cancel).await.unwrap();
        limiter.acquire("/a", "k", quota, &cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire("/a", "k", quota, &cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credentials_are_isolated() {
        let limiter = RateLimiter::new();
        let cancel = CancellationToken::new();
        let quota = Quota::per_minute(1);

        let start = Instant::now();
        limiter.acquire("/a", "user-1", quota, &cancel).await.unwrap();
        limiter.acquire("/a", "user-2", quota, &cancel).await.unwrap();
        limiter.acquire("/b", "user-1", quota, &cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
        assert_eq!(limiter.tracked_buckets().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unblocks_wait() {
        let limiter = Arc::new(RateLimiter::new());
        let cancel = CancellationToken::new();
        let quota = Quota::per_minute(1);

        limiter.acquire("/a", "k", quota, &cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire("/a", "k", quota, &cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ExchangeError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_evicts_idle() {
        let limiter = RateLimiter::new();
        let cancel = CancellationToken::new();
        limiter
            .acquire("/a", "k", Quota::per_second(5), &cancel)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        limiter
            .acquire("/b", "k", Quota::per_second(5), &cancel)
            .await
            .unwrap();

        assert_eq!(limiter.cleanup(Duration::from_secs(60)).await, 1);
        assert_eq!(limiter.tracked_buckets().await, 1);
    }

    #[test]
    fn test_quota_table_default() {
        let table = QuotaTable::new(Quota::per_second(10)).with("/order", Quota::per_second(1));
        assert_eq!(table.quota_for("/order").capacity, 1);
        assert_eq!(table.quota_for("/other").capacity, 10);
    }
}
