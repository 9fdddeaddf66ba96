//! Retry / reconnect delays
//!
//! Connectors back off exponentially between reconnect attempts and reset
//! once a connection succeeds. Request-level retries use a fixed delay.

use std::future::Future;
use std::time::Duration;

pub mod defaults {
    /// 初回リトライ待機（秒）
    pub const BASE_RETRY_DELAY_SECS: u64 = 1;
    /// 最大リトライ待機（秒）
    pub const MAX_RETRY_DELAY_SECS: u64 = 60;
}

/// リトライ遅延計算（Exponential backoff）
///
/// `base * 2^retry_count`, capped at `max`.
pub fn calculate_retry_delay(retry_count: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Stateful exponential backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
    max_attempts: Option<u32>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(defaults::BASE_RETRY_DELAY_SECS),
            Duration::from_secs(defaults::MAX_RETRY_DELAY_SECS),
        )
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
            max_attempts: None,
        }
    }

    /// Give up after `n` consecutive failures
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Delay to wait before the next attempt; doubles the following one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempts = self.attempts.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// 接続成功時にリセット
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        matches!(self.max_attempts, Some(max) if self.attempts >= max)
    }
}

/// Run `op` up to `attempts` times, sleeping `delay` between failures.
/// Returns the last error when every attempt fails.
pub async fn retry_fixed<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::warn!(attempt = attempt, max = attempts, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_calculate_retry_delay() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        assert_eq!(calculate_retry_delay(0, base, max), Duration::from_secs(1));
        assert_eq!(calculate_retry_delay(3, base, max), Duration::from_secs(8));
        // 上限60s
        assert_eq!(calculate_retry_delay(6, base, max), Duration::from_secs(60));
        assert_eq!(calculate_retry_delay(200, base, max), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default().with_max_attempts(3);
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        assert!(backoff.exhausted());

        backoff.reset();
        assert!(!backoff.exhausted());
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_fixed_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_fixed(3, Duration::ZERO, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {}", n)) }
        })
        .await;
        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fixed_stops_on_success() {
        let result: Result<u32, String> = retry_fixed(5, Duration::ZERO, |n| async move {
            if n < 2 {
                Err("not yet".to_string())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }
}
