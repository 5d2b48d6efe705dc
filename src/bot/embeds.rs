//! Embed builders for every reply the bot posts.
//!
//! Builders are pure: they take already-fetched data and return a
//! [`CreateEmbed`], so the wording can be tested without a gateway.

use serenity::all::{Colour, CreateEmbed, CreateEmbedFooter, Mentionable, Timestamp, UserId};
use std::time::Duration;

use crate::policy::{format_duration, Escalation};
use crate::storage::GuildStats;

const RED: Colour = Colour::new(0x00E7_4C3C);
const GREEN: Colour = Colour::new(0x002E_CC71);
const ORANGE: Colour = Colour::new(0x00E6_7E22);
const BLUE: Colour = Colour::new(0x0034_98DB);

const ENABLED: &str = "🟢 **ENABLED**";
const DISABLED: &str = "🔴 **DISABLED**";

/// Text reply for commands used outside a server
pub const GUILD_ONLY_TEXT: &str = "❌ This command can only be used in a server.";

/// Text reply for an empty leaderboard
pub const NO_WARNINGS_TEXT: &str = "📭 No warnings recorded in this server.";

/// Outcome of one moderation action, rendered into the channel embed.
#[derive(Debug, Clone, PartialEq)]
pub struct InfractionReport {
    /// Offending member
    pub user_id: UserId,
    /// Model score of the offending image
    pub score: f32,
    /// Warning count after this infraction
    pub warning_count: u32,
    /// Timeout applied (or attempted)
    pub timeout: Duration,
    /// Whether the message was removed
    pub message_deleted: bool,
    /// Whether the timeout was applied
    pub user_timed_out: bool,
}

const fn check_mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}

const fn status_label(enabled: bool) -> &'static str {
    if enabled {
        ENABLED
    } else {
        DISABLED
    }
}

/// Channel notice posted after an infraction
#[must_use]
pub fn infraction(report: &InfractionReport) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title("🚨 NSFW Content Detected")
        .colour(RED)
        .timestamp(Timestamp::now())
        .field("👤 User", report.user_id.mention().to_string(), true)
        .field("📊 NSFW Score", format!("`{:.3}`", report.score), true)
        .field("⚠️ Warning Count", format!("`{}`", report.warning_count), true)
        .field("⏰ Timeout Duration", format_duration(report.timeout), true)
        .field("🗑️ Message Removed", check_mark(report.message_deleted), true)
        .field("🔇 User Timed Out", check_mark(report.user_timed_out), true);

    if Escalation::is_max(report.warning_count) {
        embed = embed.field(
            "💀 Maximum Escalation",
            "User has reached maximum timeout duration",
            false,
        );
    }

    embed.footer(CreateEmbedFooter::new("Automated Moderation System"))
}

/// Reply to a member without Administrator
#[must_use]
pub fn access_denied(action: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Access Denied")
        .description(format!(
            "You need **Administrator** permissions to {action}."
        ))
        .colour(RED)
}

/// Reply to an unparsable user argument
#[must_use]
pub fn invalid_argument() -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Invalid Argument")
        .description("Please check the command usage and try again.")
        .colour(RED)
}

/// Reply when a command fails unexpectedly
#[must_use]
pub fn command_error() -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Command Error")
        .description("An unexpected error occurred.")
        .colour(RED)
}

/// `mod` with no or an unknown subcommand
#[must_use]
pub fn overview(prefix: &str, enabled: bool, threshold: f32, warned_users: usize) -> CreateEmbed {
    let commands = [
        ("enable", "Enable moderation in this server"),
        ("disable", "Disable moderation in this server"),
        ("status", "Server status"),
        ("warnings [user]", "Check warnings"),
        ("reset [user]", "Reset warnings"),
        ("help", "Command help"),
    ]
    .iter()
    .map(|(cmd, desc)| format!("`{prefix}mod {cmd}` - {desc}"))
    .collect::<Vec<_>>()
    .join("\n");

    CreateEmbed::new()
        .title("🛡️ Image Moderation System")
        .description("AI-powered content moderation for this server")
        .colour(BLUE)
        .field("Server Status", status_label(enabled), true)
        .field("NSFW Threshold", format!("`{threshold}`"), true)
        .field("Active Warnings", format!("`{warned_users}`"), true)
        .field("Available Commands", commands, false)
        .footer(CreateEmbedFooter::new(
            "All commands require Administrator permissions",
        ))
}

/// Confirmation for `mod enable`
#[must_use]
pub fn enabled(threshold: f32) -> CreateEmbed {
    CreateEmbed::new()
        .title("✅ Moderation Enabled")
        .description("Image moderation system is now **ACTIVE** in this server")
        .colour(GREEN)
        .field("Status", ENABLED, true)
        .field("NSFW Threshold", format!("`{threshold}`"), true)
        .field("Action", "Scanning all images for NSFW content", true)
}

/// Confirmation for `mod disable`
#[must_use]
pub fn disabled() -> CreateEmbed {
    CreateEmbed::new()
        .title("🔴 Moderation Disabled")
        .description("Image moderation system is now **INACTIVE** in this server")
        .colour(ORANGE)
        .field("Status", DISABLED, true)
        .field("Action", "No images will be scanned", true)
}

/// `mod status`
#[must_use]
pub fn status(guild_name: &str, enabled: bool, threshold: f32, stats: GuildStats) -> CreateEmbed {
    CreateEmbed::new()
        .title("📊 Moderation System Status")
        .description(format!("Status for **{guild_name}**"))
        .colour(BLUE)
        .field("System Status", status_label(enabled), true)
        .field("NSFW Threshold", format!("`{threshold}`"), true)
        .field("Total Warnings", format!("`{}`", stats.total_warnings), true)
        .field("Warned Users", format!("`{}`", stats.warned_users), true)
}

/// `mod warnings <user>`
#[must_use]
pub fn user_warnings(user_id: UserId, count: u32) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .colour(ORANGE)
        .field("👤 User", user_id.mention().to_string(), true)
        .field("⚠️ Warnings", format!("`{count}`"), true);

    if count > 0 {
        let next = Escalation::timeout_for(count.saturating_add(1));
        embed = embed.field("⏰ Next Timeout", format_duration(next), true);
    }

    embed
}

/// `mod warnings`: `entries` are `(display name, warning count)`, most warned first
#[must_use]
pub fn leaderboard(guild_name: &str, entries: &[(String, u32)]) -> CreateEmbed {
    entries.iter().fold(
        CreateEmbed::new()
            .title("⚠️ User Warning Leaderboard")
            .description(format!("Top warned users in **{guild_name}**"))
            .colour(ORANGE),
        |embed, (name, count)| {
            let timeout = format_duration(Escalation::timeout_for(*count));
            embed.field(
                name.as_str(),
                format!("Warnings: `{count}` | Timeout: `{timeout}`"),
                false,
            )
        },
    )
}

/// `mod reset`: one user when `user_id` is set, otherwise the whole server
#[must_use]
pub fn reset_done(user_id: Option<UserId>) -> CreateEmbed {
    match user_id {
        Some(user_id) => CreateEmbed::new()
            .title("✅ Warnings Reset")
            .description(format!(
                "Warnings have been reset for {}",
                user_id.mention()
            ))
            .colour(GREEN),
        None => CreateEmbed::new()
            .title("✅ All Warnings Reset")
            .description("All warnings have been reset in this server")
            .colour(GREEN),
    }
}

/// `mod help`
#[must_use]
pub fn help(prefix: &str) -> CreateEmbed {
    let commands = [
        ("enable", "Enable moderation in this server"),
        ("disable", "Disable moderation in this server"),
        ("status", "Show server status"),
        ("warnings [user]", "Check warnings for user/all in this server"),
        ("reset [user]", "Reset warnings (user/all) in this server"),
        ("help", "This help message"),
    ];

    commands
        .iter()
        .fold(
            CreateEmbed::new()
                .title("🛡️ Moderation System Help")
                .description("AI-powered image moderation commands")
                .colour(BLUE),
            |embed, (cmd, desc)| embed.field(format!("**{prefix}mod {cmd}**"), *desc, false),
        )
        .field(
            "🔐 Permissions",
            "Enable, disable and reset require **Administrator** permissions",
            false,
        )
}
