use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Spaces out calls to the model endpoint and backs off after a 429.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<RateLimitState>>,
    min_interval: Duration,
}

struct RateLimitState {
    last_request: Option<Instant>,
    blocked_until: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateLimitState {
                last_request: None,
                blocked_until: None,
            })),
            min_interval,
        }
    }

    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        // A 429 may land while we sleep and push the block further out.
        while let Some(blocked_until) = state.blocked_until {
            let now = Instant::now();
            if blocked_until <= now {
                state.blocked_until = None;
                break;
            }
            let wait_duration = blocked_until - now;
            drop(state);
            tracing::info!("Rate limited, waiting {:?}", wait_duration);
            sleep(wait_duration).await;
            state = self.state.lock().await;
        }

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                drop(state);
                tracing::debug!("Spacing requests, waiting {:?}", wait_time);
                sleep(wait_time).await;
                state = self.state.lock().await;
            }
        }

        state.last_request = Some(Instant::now());
    }

    pub async fn penalize(&self, retry_after: Duration) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + retry_after;
        if state.blocked_until.map_or(true, |current| current < until) {
            state.blocked_until = Some(until);
        }
    }

    pub async fn is_blocked(&self) -> bool {
        let state = self.state.lock().await;
        state
            .blocked_until
            .is_some_and(|until| until > Instant::now())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_min_interval_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_penalize_blocks_then_clears() {
        let limiter = RateLimiter::default();
        limiter.penalize(Duration::from_millis(30)).await;
        assert!(limiter.is_blocked().await);

        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert!(!limiter.is_blocked().await);
    }

    #[tokio::test]
    async fn test_penalty_during_wait_is_honored() {
        let limiter = RateLimiter::default();
        limiter.penalize(Duration::from_millis(50)).await;

        let waiter = limiter.clone();
        let start = Instant::now();
        let handle = tokio::spawn(async move { waiter.wait().await });

        sleep(Duration::from_millis(10)).await;
        limiter.penalize(Duration::from_millis(300)).await;

        handle.await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(290));
        assert!(!limiter.is_blocked().await);
    }

    #[tokio::test]
    async fn test_shorter_penalty_does_not_shrink_block() {
        let limiter = RateLimiter::default();
        limiter.penalize(Duration::from_secs(60)).await;
        limiter.penalize(Duration::from_millis(1)).await;
        assert!(limiter.is_blocked().await);
    }
}
