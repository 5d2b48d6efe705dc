//! Resilient messaging utilities with automatic retry for Discord REST calls.
//!
//! serenity already waits out rate limits; these wrappers add backoff for
//! gateway hiccups and 5xx responses. Permission and validation failures
//! (4xx other than 429) are returned on the first attempt.

use serenity::all::{ChannelId, Context, CreateEmbed, CreateMessage, Message};
use serenity::Error as SerenityError;

/// HTTP status of a failed REST call, if the server answered at all.
#[must_use]
pub fn http_status(err: &SerenityError) -> Option<u16> {
    match err {
        SerenityError::Http(e) => e.status_code().map(|s| s.as_u16()),
        _ => None,
    }
}

/// Whether the bot lacks permission for the attempted action.
#[must_use]
pub fn is_forbidden(err: &SerenityError) -> bool {
    http_status(err) == Some(403)
}

/// Whether retrying may succeed.
#[must_use]
pub fn is_transient(err: &SerenityError) -> bool {
    match http_status(err) {
        Some(status) => status == 429 || status >= 500,
        // No response: connection reset, timeout, gateway I/O
        None => matches!(
            err,
            SerenityError::Http(_) | SerenityError::Io(_) | SerenityError::Gateway(_)
        ),
    }
}

/// Send an embed with automatic retry on transient failures.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient one.
pub async fn send_embed_resilient(
    ctx: &Context,
    channel_id: ChannelId,
    embed: CreateEmbed,
) -> Result<Message, SerenityError> {
    crate::utils::retry_operation(
        || channel_id.send_message(ctx, CreateMessage::new().embed(embed.clone())),
        is_transient,
    )
    .await
}

/// Send plain text with automatic retry on transient failures.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient one.
pub async fn send_text_resilient(
    ctx: &Context,
    channel_id: ChannelId,
    text: &str,
) -> Result<Message, SerenityError> {
    crate::utils::retry_operation(
        || channel_id.send_message(ctx, CreateMessage::new().content(text)),
        is_transient,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_http_errors() {
        let err = SerenityError::Other("boom");
        assert_eq!(http_status(&err), None);
        assert!(!is_forbidden(&err));
        assert!(!is_transient(&err));

        let err = SerenityError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t"));
        assert!(is_transient(&err));
    }
}
