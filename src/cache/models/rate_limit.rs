use std::time::Duration;

use tokio::time::Instant;

/// 单个客户端的限流窗口
#[derive(Debug, Clone, Copy)]
pub struct QuotaWindow {
    pub window_start: Instant,
    pub count: u64,
}

impl QuotaWindow {
    pub fn open(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    pub fn is_elapsed(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.window_start) >= window
    }

    pub fn resets_in(&self, now: Instant, window: Duration) -> Duration {
        (self.window_start + window).saturating_duration_since(now)
    }
}

/// 一次计数后的窗口状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub count: u64,
    pub resets_in: Duration,
}
