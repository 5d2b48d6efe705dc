//! Actions taken against a message that carried a flagged image.

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use serenity::all::{Context, EditMember, GuildId, Message, Timestamp, UserId};
use serenity::Error as SerenityError;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::embeds::{self, InfractionReport};
use super::resilient::{is_forbidden, is_transient, send_embed_resilient};
use super::BotState;
use crate::policy::{format_duration, Escalation};
use crate::storage::ModerationLogEntry;
use crate::utils::retry_operation;

/// Audit-log reason attached to the timeout
#[must_use]
pub fn timeout_reason(score: f32) -> String {
    format!("NSFW image detected (score: {score:.3})")
}

/// Log entry describing a completed infraction
#[must_use]
pub fn log_entry(guild_id: u64, channel_id: u64, report: &InfractionReport) -> ModerationLogEntry {
    ModerationLogEntry {
        id: Uuid::new_v4(),
        guild_id,
        user_id: report.user_id.get(),
        channel_id,
        score: report.score,
        warning_count: report.warning_count,
        timeout_secs: report.timeout.as_secs(),
        message_deleted: report.message_deleted,
        user_timed_out: report.user_timed_out,
        timestamp: Utc::now(),
    }
}

/// Warn, delete, time out and report.
///
/// Delete and timeout failures do not abort the sequence; they show up as
/// ❌ in the channel notice.
///
/// # Errors
///
/// Returns an error if the moderation data cannot be saved.
pub async fn handle_infraction(
    ctx: &Context,
    msg: &Message,
    state: &BotState,
    score: f32,
) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let user_id = msg.author.id;

    let warning_count = state
        .store
        .increment_warning(guild_id.get(), user_id.get())
        .await;
    let timeout = Escalation::timeout_for(warning_count);

    info!(
        guild_id = %guild_id,
        user_id = %user_id,
        score,
        warning_count,
        "🚨 NSFW image detected, timeout {}",
        format_duration(timeout)
    );

    let message_deleted = delete_message(ctx, msg).await;
    let user_timed_out = timeout_member(ctx, guild_id, user_id, timeout, score).await;

    let report = InfractionReport {
        user_id,
        score,
        warning_count,
        timeout,
        message_deleted,
        user_timed_out,
    };

    if let Err(e) = send_embed_resilient(ctx, msg.channel_id, embeds::infraction(&report)).await {
        error!(channel_id = %msg.channel_id, "Failed to post moderation notice: {e}");
    }

    state
        .store
        .record_action(log_entry(guild_id.get(), msg.channel_id.get(), &report))
        .await?;
    Ok(())
}

async fn delete_message(ctx: &Context, msg: &Message) -> bool {
    match retry_operation(|| msg.delete(ctx), is_transient).await {
        Ok(()) => true,
        Err(e) => {
            log_action_failure("delete message", &e);
            false
        }
    }
}

async fn timeout_member(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
    timeout: Duration,
    score: f32,
) -> bool {
    let until = match TimeDelta::from_std(timeout) {
        Ok(delta) => Timestamp::from(Utc::now() + delta),
        Err(e) => {
            error!("Timeout {timeout:?} out of range: {e}");
            return false;
        }
    };
    let reason = timeout_reason(score);

    let result = retry_operation(
        || {
            guild_id.edit_member(
                ctx,
                user_id,
                EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(&reason),
            )
        },
        is_transient,
    )
    .await;

    match result {
        Ok(_) => true,
        Err(e) => {
            log_action_failure("time out member", &e);
            false
        }
    }
}

fn log_action_failure(action: &str, err: &SerenityError) {
    if is_forbidden(err) {
        warn!("Missing permissions to {action}");
    } else {
        error!("Failed to {action}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_reason_rounds_score() {
        assert_eq!(timeout_reason(0.87654), "NSFW image detected (score: 0.877)");
        assert_eq!(timeout_reason(1.0), "NSFW image detected (score: 1.000)");
    }

    #[test]
    fn test_log_entry_mirrors_report() {
        let report = InfractionReport {
            user_id: UserId::new(9),
            score: 0.75,
            warning_count: 3,
            timeout: Escalation::timeout_for(3),
            message_deleted: true,
            user_timed_out: false,
        };

        let entry = log_entry(1, 2, &report);
        assert_eq!(entry.guild_id, 1);
        assert_eq!(entry.channel_id, 2);
        assert_eq!(entry.user_id, 9);
        assert_eq!(entry.warning_count, 3);
        assert_eq!(entry.timeout_secs, 3 * 3600);
        assert!(entry.message_deleted);
        assert!(!entry.user_timed_out);
    }
}
