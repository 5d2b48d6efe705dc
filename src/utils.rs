//! Utility functions for retrying flaky network calls and trimming text to
//! Discord's field limits.

use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::{Condition, RetryIf};
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{API_BACKOFF_BASE, API_BACKOFF_FACTOR_MS, API_MAX_BACKOFF_MS, API_MAX_RETRIES};

/// Safely truncates a string to a maximum number of grapheme clusters.
///
/// Emoji and combined characters are never split, which keeps Discord from
/// rejecting an embed field with a broken code point sequence.
///
/// # Examples
///
/// ```
/// use image_moderator::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_graphemes: usize) -> String {
    let s = s.as_ref();
    s.grapheme_indices(true)
        .nth(max_graphemes)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(API_BACKOFF_BASE)
        .factor(API_BACKOFF_FACTOR_MS)
        .max_delay(Duration::from_millis(API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(API_MAX_RETRIES)
}

/// Retry an operation with exponential backoff while `should_retry` holds.
///
/// Errors rejected by `should_retry` are returned immediately. The strategy
/// uses jittered exponential backoff:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max retries: 3 (see constants in `config.rs`)
///
/// # Examples
///
/// ```no_run
/// use image_moderator::utils::retry_operation;
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let bytes = retry_operation(
///     || async { Ok::<_, std::io::Error>(vec![0u8; 4]) },
///     |e: &std::io::Error| e.kind() == std::io::ErrorKind::TimedOut,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-retryable error.
pub async fn retry_operation<F, Fut, T, E, C>(operation: F, should_retry: C) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Condition<E>,
{
    RetryIf::spawn(retry_strategy(), operation, should_retry)
        .await
        .map_err(|e| {
            warn!("Operation failed after retries: {}", e);
            e
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_truncate_str_keeps_emoji_whole() {
        let s = "👍🏽👍🏽👍🏽";
        assert_eq!(truncate_str(s, 1), "👍🏽");
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, String> = retry_operation(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("transient".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            |_: &String| true,
        )
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_skips_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, String> = retry_operation(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("forbidden".to_string()) }
            },
            |e: &String| e != "forbidden",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
