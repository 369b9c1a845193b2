//! Sliding-window per-user rate limiter. Owner is exempt by default.
//!
//! Ported from the reference `RateLimiter`: a deque of request timestamps per
//! user, pruned to the current window on every check.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use warden_core::types::{AccessLevel, UserId};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
    pub owner_exempt: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 4,
            window_seconds: 60,
            owner_exempt: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserStatus {
    pub requests_made: usize,
    pub remaining: usize,
    pub max_requests: u32,
    pub window_seconds: u64,
    pub reset_in_seconds: u64,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: DashMap<UserId, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn update_limits(&mut self, config: RateLimiterConfig) {
        self.config = config;
    }

    /// Check whether `user_id` at `access_level` may proceed right now.
    /// Returns `(allowed, message)` — `message` is empty when allowed.
    pub fn check(&self, user_id: &UserId, access_level: AccessLevel) -> (bool, String) {
        if self.config.owner_exempt && access_level.is_owner() {
            return (true, String::new());
        }

        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();

        let mut entry = self.windows.entry(user_id.clone()).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= self.config.max_requests as usize {
            let oldest = entry[0];
            let elapsed = now.duration_since(oldest);
            let remaining = window.saturating_sub(elapsed).as_secs().max(1);
            return (
                false,
                format!("Rate limit reached. Please wait {remaining}s before trying again."),
            );
        }

        entry.push(now);
        (true, String::new())
    }

    pub fn reset_user(&self, user_id: &UserId) {
        self.windows.remove(user_id);
    }

    pub fn reset_all(&self) {
        self.windows.clear();
    }

    pub fn get_user_status(&self, user_id: &UserId) -> UserStatus {
        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();

        let requests_made = self
            .windows
            .get(user_id)
            .map(|entry| entry.iter().filter(|t| now.duration_since(**t) < window).count())
            .unwrap_or(0);

        let reset_in_seconds = self
            .windows
            .get(user_id)
            .and_then(|entry| entry.first().copied())
            .map(|oldest| window.saturating_sub(now.duration_since(oldest)).as_secs())
            .unwrap_or(0);

        UserStatus {
            requests_made,
            remaining: (self.config.max_requests as usize).saturating_sub(requests_made),
            max_requests: self.config.max_requests,
            window_seconds: self.config.window_seconds,
            reset_in_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_requests() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 2,
            window_seconds: 60,
            owner_exempt: true,
        });
        let user = UserId::from("u1");
        assert!(limiter.check(&user, AccessLevel::Public).0);
        assert!(limiter.check(&user, AccessLevel::Public).0);
        assert!(!limiter.check(&user, AccessLevel::Public).0);
    }

    #[test]
    fn owner_is_exempt() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window_seconds: 60,
            owner_exempt: true,
        });
        let owner = UserId::from("owner");
        for _ in 0..10 {
            assert!(limiter.check(&owner, AccessLevel::Owner).0);
        }
    }

    #[test]
    fn reset_user_clears_window() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window_seconds: 60,
            owner_exempt: true,
        });
        let user = UserId::from("u2");
        assert!(limiter.check(&user, AccessLevel::Public).0);
        assert!(!limiter.check(&user, AccessLevel::Public).0);
        limiter.reset_user(&user);
        assert!(limiter.check(&user, AccessLevel::Public).0);
    }
}
