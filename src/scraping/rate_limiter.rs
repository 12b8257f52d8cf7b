use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Rolling-window rate limiter: at most `max_requests` may be issued in any
/// 1-second window. Callers suspend in `limit()` until capacity is free;
/// the mutex serializes access so concurrent callers proceed FIFO by lock
/// acquisition order.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests_per_second: usize) -> Self {
        Self {
            max_requests: max_requests_per_second.max(1),
            window: Duration::from_secs(1),
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Suspend until issuing one more request keeps the window under limit,
    /// then record the request.
    pub async fn limit(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(front) = timestamps.front() {
                    if now.duration_since(*front) >= self.window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return;
                }
                // Saturated: wait until the oldest timestamp exits the window.
                let oldest = *timestamps.front().expect("window is saturated");
                self.window - now.duration_since(oldest)
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
