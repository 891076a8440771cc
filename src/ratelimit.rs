//! ratelimit.rs — fixed-window request limiter keyed by caller identity.
//! Independent of the conversation-level cooldown gate: this guards the
//! endpoint itself against one account hammering it across conversations.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::config::RateLimitConfig;

struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

struct LimiterState {
    windows: HashMap<String, Window>,
    last_prune: DateTime<Utc>,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            window: Duration::seconds(cfg.window_secs),
            max_requests: cfg.max_requests,
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_prune: Utc::now(),
            }),
        }
    }

    /// Count one request; `false` means the caller is over the window cap.
    pub fn check(&self, caller_id: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().expect("limiter lock");
        // Drop callers whose window has expired, at most once per window,
        // so the map does not grow with every identity ever seen.
        if now - state.last_prune >= self.window {
            let window = self.window;
            state.windows.retain(|_, w| now - w.started_at < window);
            state.last_prune = now;
        }
        let entry = state.windows.entry(caller_id.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now - entry.started_at >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    #[cfg(test)]
    fn tracked_callers(&self) -> usize {
        self.state.lock().expect("limiter lock").windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_secs: i64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window_secs,
            max_requests: max,
        })
    }

    #[test]
    fn caps_within_window() {
        let rl = limiter(2, 60);
        let now = Utc::now();
        assert!(rl.check("u1", now));
        assert!(rl.check("u1", now));
        assert!(!rl.check("u1", now));
        // Other callers have their own window.
        assert!(rl.check("u2", now));
    }

    #[test]
    fn window_rollover_resets_count() {
        let rl = limiter(1, 60);
        let now = Utc::now();
        assert!(rl.check("u1", now));
        assert!(!rl.check("u1", now + Duration::seconds(30)));
        assert!(rl.check("u1", now + Duration::seconds(61)));
    }

    #[test]
    fn stale_windows_are_pruned() {
        let rl = limiter(5, 60);
        let now = Utc::now();
        assert!(rl.check("u1", now));
        assert!(rl.check("u2", now));
        assert_eq!(rl.tracked_callers(), 2);
        // A request past the window evicts both expired entries before
        // inserting the new caller.
        assert!(rl.check("u3", now + Duration::seconds(61)));
        assert_eq!(rl.tracked_callers(), 1);
    }
}
