//! Per-user sliding-window rate limiting, counted per command mode.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// The two rate-limited command modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Chat,
    Coach,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Coach => "coach",
        }
    }
}

/// Sliding one-minute window over message timestamps, per (user, mode).
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    buckets: Mutex<HashMap<(String, Mode), VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(60),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt. Returns `(allowed, remaining_in_window)`.
    pub fn allow(&self, user_id: &str, mode: Mode) -> (bool, u32) {
        self.allow_at(user_id, mode, Instant::now())
    }

    fn allow_at(&self, user_id: &str, mode: Mode, now: Instant) -> (bool, u32) {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry((user_id.to_string(), mode)).or_default();
        while bucket.front().is_some_and(|t| now.duration_since(*t) > self.window) {
            bucket.pop_front();
        }
        if bucket.len() >= self.limit as usize {
            return (false, 0);
        }
        bucket.push_back(now);
        (true, self.limit.saturating_sub(bucket.len() as u32))
    }

    /// Clear the window for a user, for one mode or all of them.
    pub fn reset(&self, user_id: &str, mode: Option<Mode>) {
        let mut buckets = self.buckets.lock();
        match mode {
            Some(mode) => {
                buckets.remove(&(user_id.to_string(), mode));
            }
            None => buckets.retain(|(uid, _), _| uid != user_id),
        }
    }
}
