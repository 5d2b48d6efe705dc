//! "Access Denied" flood protection
//!
//! Members without Administrator who keep invoking admin commands get one
//! denial embed per cooldown period. Further attempts are dropped silently,
//! with throttled logging, so the bot never spams a channel or trips
//! Discord's rate limits.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tracks when each user last received an "Access Denied" reply
#[derive(Clone)]
pub struct DenialCache {
    /// user_id -> time the last denial was sent; TTL handles cleanup
    cache: Cache<u64, Instant>,
    /// Minimum gap between denials to the same user
    cooldown: Duration,
    /// Silenced attempts, for log throttling
    silenced_count: Arc<AtomicU64>,
}

impl DenialCache {
    /// Creates a new `DenialCache`
    ///
    /// # Arguments
    ///
    /// * `cooldown_secs` - Seconds between denial replies to the same user
    /// * `ttl_secs` - Time-to-live for cache entries; raised to the cooldown if lower
    /// * `max_capacity` - Maximum number of entries in cache
    ///
    /// # Examples
    ///
    /// ```
    /// use image_moderator::bot::DenialCache;
    ///
    /// let cache = DenialCache::new(
    ///     300,    // 5 minutes cooldown
    ///     3600,   // 1 hour TTL
    ///     10_000  // max 10k entries
    /// );
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs.max(cooldown_secs).max(1)))
            .build();

        Self {
            cache,
            cooldown: Duration::from_secs(cooldown_secs),
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a denial reply should be sent to `user_id` now.
    ///
    /// Only every 100th silenced attempt is logged.
    pub async fn should_send(&self, user_id: u64, user_name: &str) -> bool {
        let Some(last_sent) = self.cache.get(&user_id).await else {
            return true;
        };
        if last_sent.elapsed() >= self.cooldown {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 100 == 0 {
            debug!(
                "⛔️ Silenced {} denied command attempts (recent: user {} - {})",
                count, user_id, user_name
            );
        }

        false
    }

    /// Record that a denial was sent, starting the cooldown
    pub async fn mark_sent(&self, user_id: u64) {
        self.cache.insert(user_id, Instant::now()).await;
    }

    /// Returns the total number of silenced attempts
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }

    /// Returns the configured cooldown duration
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_attempt_should_send() {
        let cache = DenialCache::new(60, 120, 100);
        assert!(cache.should_send(12345, "TestUser").await);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_attempt() {
        let cache = DenialCache::new(60, 120, 100);

        assert!(cache.should_send(12345, "TestUser").await);
        cache.mark_sent(12345).await;

        assert!(!cache.should_send(12345, "TestUser").await);
    }

    #[tokio::test]
    async fn test_zero_cooldown_never_blocks() {
        let cache = DenialCache::new(0, 0, 100);
        cache.mark_sent(12345).await;
        assert!(cache.should_send(12345, "TestUser").await);
        assert_eq!(cache.cooldown(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_different_users_independent() {
        let cache = DenialCache::new(60, 120, 100);

        cache.mark_sent(111).await;
        assert!(cache.should_send(222, "User2").await);
    }

    #[tokio::test]
    async fn test_silenced_count_increments() {
        let cache = DenialCache::new(60, 120, 100);
        cache.mark_sent(12345).await;

        for _ in 0..5 {
            cache.should_send(12345, "TestUser").await;
        }

        assert_eq!(cache.silenced_count(), 5);
    }
}
