use std::time::{Duration, Instant};

use dashmap::DashMap;
use telemetry_app::AppError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    admitted: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), AppError> {
        self.check_at(key, Instant::now())
    }

    /// Admits up to `max_requests` per window for `key`; past that the
    /// error carries the whole seconds until the window resets.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), AppError> {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            admitted: 0,
        });
        let window = entry.value_mut();
        if now.saturating_duration_since(window.started) >= self.window {
            window.started = now;
            window.admitted = 0;
        }
        if window.admitted < self.max_requests {
            window.admitted += 1;
            return Ok(());
        }
        let remaining = self
            .window
            .saturating_sub(now.saturating_duration_since(window.started));
        Err(AppError::RateLimited {
            retry_after_secs: remaining.as_secs_f64().ceil().max(1.0) as u64,
        })
    }

    pub fn purge_stale(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.started) < self.window);
        before - self.windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub async fn run_cleanup(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.window);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = self.purge_stale(Instant::now());
                    if purged > 0 {
                        debug!(purged, "rate limiter purged stale keys");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_request_in_window_is_denied() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();
        for offset in 0..5 {
            assert!(
                limiter
                    .check_at("127.0.0.1", start + Duration::from_secs(offset))
                    .is_ok()
            );
        }
        let denied = limiter.check_at("127.0.0.1", start + Duration::from_secs(10));
        match denied {
            Err(AppError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 50),
            other => panic!("expected rate limit, got {other:?}"),
        }
        assert!(limiter.check_at("10.0.0.2", start).is_ok());
    }

    #[test]
    fn admissions_resume_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("client", start).is_ok());
        assert!(limiter.check_at("client", start + Duration::from_secs(59)).is_err());
        assert!(limiter.check_at("client", start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn purge_drops_only_expired_keys() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        limiter.check_at("old", start).expect("admit");
        limiter
            .check_at("fresh", start + Duration::from_secs(30))
            .expect("admit");
        assert_eq!(limiter.purge_stale(start + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
