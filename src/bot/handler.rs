//! Gateway event handler.

use serenity::all::{ActivityData, Attachment, Context, EventHandler, Message, Ready};
use serenity::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::commands::{self, parse_command};
use super::embeds;
use super::moderation::handle_infraction;
use super::resilient::send_embed_resilient;
use super::BotState;
use crate::analyzer::ImageAnalyzer;
use crate::policy::is_violation;

/// Routes `ready` and `message` events
pub struct Handler {
    state: Arc<BotState>,
}

impl Handler {
    /// Create a handler over shared bot state
    #[must_use]
    pub const fn new(state: Arc<BotState>) -> Self {
        Self { state }
    }

    async fn run_command(&self, ctx: &Context, msg: &Message) {
        let Some(parsed) = parse_command(&msg.content, &self.state.settings.command_prefix) else {
            return;
        };

        if let Err(e) = commands::execute(ctx, msg, &self.state, parsed).await {
            error!(user_id = %msg.author.id, "Command failed: {e:#}");
            if let Err(e) = send_embed_resilient(ctx, msg.channel_id, embeds::command_error()).await
            {
                warn!("Failed to report command error: {e}");
            }
        }
    }

    async fn scan_attachments(&self, ctx: &Context, msg: &Message) {
        let attachments: Vec<ScannedAttachment<'_>> =
            msg.attachments.iter().map(ScannedAttachment::from).collect();

        let Some(score) = first_violation(
            &self.state.analyzer,
            &attachments,
            self.state.settings.nsfw_threshold,
            self.state.settings.max_image_bytes,
        )
        .await
        else {
            return;
        };

        if let Err(e) = handle_infraction(ctx, msg, &self.state, score).await {
            error!(message_id = %msg.id, "Failed to record infraction: {e:#}");
        }
    }
}

/// Attachment fields the scanner looks at
#[derive(Debug, Clone, Copy)]
pub struct ScannedAttachment<'a> {
    /// File name, for logs
    pub filename: &'a str,
    /// CDN URL
    pub url: &'a str,
    /// Content type reported by Discord
    pub content_type: Option<&'a str>,
    /// Size in bytes reported by Discord
    pub size: u64,
}

impl<'a> From<&'a Attachment> for ScannedAttachment<'a> {
    fn from(attachment: &'a Attachment) -> Self {
        Self {
            filename: &attachment.filename,
            url: &attachment.url,
            content_type: attachment.content_type.as_deref(),
            size: u64::from(attachment.size),
        }
    }
}

/// Score of the first attachment that reaches `threshold`, if any.
///
/// Non-images and attachments over `max_bytes` are never downloaded.
/// Attachments that fail analysis are skipped. Scanning stops at the
/// first violation.
pub async fn first_violation(
    analyzer: &ImageAnalyzer,
    attachments: &[ScannedAttachment<'_>],
    threshold: f32,
    max_bytes: u64,
) -> Option<f32> {
    for attachment in attachments
        .iter()
        .filter(|a| is_image_content_type(a.content_type))
    {
        if attachment.size > max_bytes {
            debug!(
                attachment = attachment.filename,
                size = attachment.size,
                "Skipping oversized attachment"
            );
            continue;
        }

        let score = match analyzer
            .analyze(attachment.url, attachment.content_type)
            .await
        {
            Ok(score) => score,
            Err(e) => {
                warn!(attachment = attachment.filename, "Image analysis failed: {e}");
                continue;
            }
        };
        debug!(attachment = attachment.filename, score, "Image scored");

        if is_violation(score, threshold) {
            return Some(score);
        }
    }
    None
}

/// Whether an attachment's reported content type is an image
#[must_use]
pub fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.contains("image"))
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("✅ {} is online!", ready.user.name);
        info!(
            "🛡️ Moderation enabled in {} servers",
            self.state.store.enabled_count().await
        );
        ctx.set_activity(Some(ActivityData::watching("for NSFW content 👀")));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        self.run_command(&ctx, &msg).await;

        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if msg.attachments.is_empty() || !self.state.store.is_enabled(guild_id.get()).await {
            return;
        }

        self.scan_attachments(&ctx, &msg).await;
    }
}
