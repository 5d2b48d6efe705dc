//! Client construction and lifecycle.

use anyhow::{Context as _, Result};
use serenity::all::GatewayIntents;
use serenity::Client;
use std::sync::Arc;
use tracing::{error, info};

use super::{BotState, Handler};

/// Gateway intents the bot needs: messages with content, member lookups
/// for admin checks, and moderation rights for timeouts.
#[must_use]
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MODERATION
}

/// Connect to Discord and dispatch events until Ctrl-C.
///
/// Moderation data is saved once more after the client stops.
///
/// # Errors
///
/// Returns an error if the client cannot be built or the gateway
/// connection fails.
pub async fn run_bot(state: Arc<BotState>) -> Result<()> {
    let mut client = Client::builder(&state.settings.discord_token, intents())
        .event_handler(Handler::new(Arc::clone(&state)))
        .await
        .context("Failed to create Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown signal received, closing shards...");
        shard_manager.shutdown_all().await;
    });

    info!("Bot is running...");
    let result = client.start().await;

    if let Err(e) = state.store.save().await {
        error!("Failed to save moderation data on shutdown: {}", e);
    } else {
        info!("Moderation data saved to {}", state.store.path().display());
    }

    log_session_stats(&state).await;
    result.context("Discord client stopped with an error")
}

async fn log_session_stats(state: &BotState) {
    let data = state.store.snapshot().await;
    info!(
        "Session stats: {} servers enabled, {} moderation log entries, {} cached scores",
        data.enabled_count(),
        data.moderation_log.len(),
        state.analyzer.cached_scores()
    );
    info!(
        "DenialCache: {} attempts silenced (cooldown: {}s)",
        state.denials.silenced_count(),
        state.denials.cooldown().as_secs()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intents_cover_moderation() {
        let intents = intents();
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(intents.contains(GatewayIntents::GUILD_MEMBERS));
        assert!(intents.contains(GatewayIntents::GUILD_MODERATION));
        assert!(!intents.contains(GatewayIntents::DIRECT_MESSAGES));
    }
}
