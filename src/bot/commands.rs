//! `{prefix}mod` command parsing and execution.

// lazy_regex! statics are built on once_cell
#![allow(clippy::non_std_lazy_statics)]

use anyhow::Result;
use lazy_regex::lazy_regex;
use serenity::all::{Context, CreateEmbed, GuildId, Member, Message, UserId};
use thiserror::Error;
use tracing::{info, warn};

use super::embeds;
use super::resilient::{send_embed_resilient, send_text_resilient};
use super::BotState;
use crate::config::WARNINGS_LEADERBOARD_SIZE;
use crate::utils::truncate_str;

/// `<@id>`, `<@!id>` or a bare id
static RE_USER_ARG: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^(?:<@!?(\d+)>|(\d+))$");

/// Discord's limit on embed field names
const FIELD_NAME_MAX: usize = 256;

/// A parsed `mod` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModCommand {
    /// `mod` alone or an unknown subcommand
    Overview,
    /// `mod enable`
    Enable,
    /// `mod disable`
    Disable,
    /// `mod status`
    Status,
    /// `mod warnings [user]`
    Warnings(Option<UserId>),
    /// `mod reset [user]`
    Reset(Option<UserId>),
    /// `mod help`
    Help,
}

impl ModCommand {
    /// Whether the invoker must hold Administrator
    #[must_use]
    pub const fn requires_admin(self) -> bool {
        matches!(
            self,
            Self::Overview | Self::Enable | Self::Disable | Self::Reset(_)
        )
    }

    /// Phrase completing "You need Administrator permissions to ..."
    #[must_use]
    pub const fn denied_action(self) -> &'static str {
        match self {
            Self::Enable => "enable moderation",
            Self::Disable => "disable moderation",
            Self::Reset(_) => "reset warnings",
            _ => "use moderation commands",
        }
    }
}

/// Command argument errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The user argument is neither a mention nor an id
    #[error("invalid user argument: {0}")]
    InvalidUser(String),
}

/// Parse a `{prefix}mod ...` message.
///
/// Returns `None` when `content` is not a `mod` command at all.
#[must_use]
pub fn parse_command(content: &str, prefix: &str) -> Option<Result<ModCommand, CommandError>> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let mut tokens = rest.split_whitespace();
    if tokens.next()? != "mod" {
        return None;
    }

    let command = match tokens.next() {
        Some("enable") => Ok(ModCommand::Enable),
        Some("disable") => Ok(ModCommand::Disable),
        Some("status") => Ok(ModCommand::Status),
        Some("help") => Ok(ModCommand::Help),
        Some("warnings") => parse_user(tokens.next()).map(ModCommand::Warnings),
        Some("reset") => parse_user(tokens.next()).map(ModCommand::Reset),
        _ => Ok(ModCommand::Overview),
    };
    Some(command)
}

fn parse_user(arg: Option<&str>) -> Result<Option<UserId>, CommandError> {
    let Some(arg) = arg else {
        return Ok(None);
    };

    RE_USER_ARG
        .captures(arg)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|id| id.as_str().parse::<u64>().ok())
        .filter(|id| *id != 0)
        .map(|id| Some(UserId::new(id)))
        .ok_or_else(|| CommandError::InvalidUser(arg.to_string()))
}

/// Run a parsed command from `msg`.
///
/// # Errors
///
/// Returns an error if Discord or the data file cannot be reached.
pub async fn execute(
    ctx: &Context,
    msg: &Message,
    state: &BotState,
    parsed: Result<ModCommand, CommandError>,
) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        send_text_resilient(ctx, msg.channel_id, embeds::GUILD_ONLY_TEXT).await?;
        return Ok(());
    };

    let command = match parsed {
        Ok(command) => command,
        Err(e) => {
            warn!(guild_id = %guild_id, "Rejected command: {e}");
            send_embed_resilient(ctx, msg.channel_id, embeds::invalid_argument()).await?;
            return Ok(());
        }
    };

    if command.requires_admin() && !is_admin(ctx, guild_id, msg.author.id).await? {
        if state.denials.should_send(msg.author.id.get(), &msg.author.name).await {
            info!(
                "⛔️ Non-admin {} ({}) used {:?}. Sending denial message.",
                msg.author.id, msg.author.name, command
            );
            send_embed_resilient(
                ctx,
                msg.channel_id,
                embeds::access_denied(command.denied_action()),
            )
            .await?;
            state.denials.mark_sent(msg.author.id.get()).await;
        }
        return Ok(());
    }

    match reply(ctx, msg, state, guild_id, command).await? {
        Reply::Embed(embed) => send_embed_resilient(ctx, msg.channel_id, embed).await?,
        Reply::Text(text) => send_text_resilient(ctx, msg.channel_id, text).await?,
    };
    Ok(())
}

enum Reply {
    Embed(CreateEmbed),
    Text(&'static str),
}

async fn reply(
    ctx: &Context,
    msg: &Message,
    state: &BotState,
    guild_id: GuildId,
    command: ModCommand,
) -> Result<Reply> {
    let settings = &state.settings;
    let store = &state.store;
    let guild = guild_id.get();

    let embed = match command {
        ModCommand::Overview => {
            let enabled = store.is_enabled(guild).await;
            let stats = store.guild_stats(guild).await;
            embeds::overview(
                &settings.command_prefix,
                enabled,
                settings.nsfw_threshold,
                stats.warned_users,
            )
        }
        ModCommand::Enable | ModCommand::Disable => {
            let enable = command == ModCommand::Enable;
            store.set_enabled(guild, enable).await?;
            info!(
                "Moderation {} in {} by {}",
                if enable { "enabled" } else { "disabled" },
                guild_name(ctx, guild_id),
                msg.author.name
            );
            if enable {
                embeds::enabled(settings.nsfw_threshold)
            } else {
                embeds::disabled()
            }
        }
        ModCommand::Status => {
            let enabled = store.is_enabled(guild).await;
            let stats = store.guild_stats(guild).await;
            embeds::status(
                &guild_name(ctx, guild_id),
                enabled,
                settings.nsfw_threshold,
                stats,
            )
        }
        ModCommand::Warnings(Some(user_id)) => {
            let count = store.user_warnings(guild, user_id.get()).await;
            embeds::user_warnings(user_id, count)
        }
        ModCommand::Warnings(None) => {
            let top = store.top_warned(guild, WARNINGS_LEADERBOARD_SIZE).await;
            if top.is_empty() {
                return Ok(Reply::Text(embeds::NO_WARNINGS_TEXT));
            }

            let mut entries = Vec::with_capacity(top.len());
            for (user_id, count) in top {
                entries.push((display_name(ctx, user_id).await, count));
            }
            embeds::leaderboard(&guild_name(ctx, guild_id), &entries)
        }
        ModCommand::Reset(user_id) => {
            store
                .reset_warnings(guild, user_id.map(UserId::get))
                .await?;
            let target = user_id.map_or_else(|| "everyone".to_string(), |id| id.to_string());
            info!(
                "Warnings reset for {} in {} by {}",
                target,
                guild_name(ctx, guild_id),
                msg.author.name
            );
            embeds::reset_done(user_id)
        }
        ModCommand::Help => embeds::help(&settings.command_prefix),
    };

    Ok(Reply::Embed(embed))
}

async fn is_admin(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<bool> {
    let member = guild_id.member(ctx, user_id).await?;
    Ok(member_is_admin(ctx, guild_id, &member))
}

#[allow(deprecated)]
fn member_is_admin(ctx: &Context, guild_id: GuildId, member: &Member) -> bool {
    guild_id
        .to_guild_cached(&ctx.cache)
        .is_some_and(|guild| guild.member_permissions(member).administrator())
}

fn guild_name(ctx: &Context, guild_id: GuildId) -> String {
    guild_id
        .name(&ctx.cache)
        .unwrap_or_else(|| "this server".to_string())
}

async fn display_name(ctx: &Context, user_id: u64) -> String {
    let unknown = || format!("Unknown ({user_id})");
    if user_id == 0 {
        return unknown();
    }
    match UserId::new(user_id).to_user(ctx).await {
        Ok(user) => truncate_str(&user.name, FIELD_NAME_MAX),
        Err(_) => unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Option<Result<ModCommand, CommandError>> {
        parse_command(content, ":")
    }

    #[test]
    fn test_non_commands_are_ignored() {
        assert_eq!(parse("hello"), None);
        assert_eq!(parse(":modx enable"), None);
        assert_eq!(parse("mod enable"), None);
        assert_eq!(parse(":"), None);
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(parse(":mod"), Some(Ok(ModCommand::Overview)));
        assert_eq!(parse(":mod bogus"), Some(Ok(ModCommand::Overview)));
        assert_eq!(parse(":mod enable"), Some(Ok(ModCommand::Enable)));
        assert_eq!(parse("  :mod   disable "), Some(Ok(ModCommand::Disable)));
        assert_eq!(parse(":mod status"), Some(Ok(ModCommand::Status)));
        assert_eq!(parse(":mod help"), Some(Ok(ModCommand::Help)));
        assert_eq!(parse(":mod warnings"), Some(Ok(ModCommand::Warnings(None))));
        assert_eq!(parse(":mod reset"), Some(Ok(ModCommand::Reset(None))));
    }

    #[test]
    fn test_user_arguments() {
        let user = Some(UserId::new(123_456));
        assert_eq!(
            parse(":mod warnings <@123456>"),
            Some(Ok(ModCommand::Warnings(user)))
        );
        assert_eq!(
            parse(":mod reset <@!123456>"),
            Some(Ok(ModCommand::Reset(user)))
        );
        assert_eq!(
            parse(":mod warnings 123456"),
            Some(Ok(ModCommand::Warnings(user)))
        );
    }

    #[test]
    fn test_invalid_user_arguments() {
        for arg in ["someone", "<@abc>", "0", "<@0>", "99999999999999999999999"] {
            let content = format!(":mod reset {arg}");
            assert_eq!(
                parse(&content),
                Some(Err(CommandError::InvalidUser(arg.to_string()))),
                "{content}"
            );
        }
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(
            parse_command("!mod status", "!"),
            Some(Ok(ModCommand::Status))
        );
        assert_eq!(parse_command(":mod status", "!"), None);
    }

    #[test]
    fn test_admin_requirements() {
        assert!(ModCommand::Overview.requires_admin());
        assert!(ModCommand::Enable.requires_admin());
        assert!(ModCommand::Disable.requires_admin());
        assert!(ModCommand::Reset(None).requires_admin());
        assert!(!ModCommand::Status.requires_admin());
        assert!(!ModCommand::Warnings(None).requires_admin());
        assert!(!ModCommand::Help.requires_admin());
        assert_eq!(ModCommand::Reset(None).denied_action(), "reset warnings");
    }
}
