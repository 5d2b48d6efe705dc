/// `{prefix}mod` command parsing and execution
pub mod commands;
/// "Access Denied" cooldown cache
pub mod denial_cache;
/// Embed builders
pub mod embeds;
/// Gateway event handler
pub mod handler;
/// Delete, time out and report offending messages
pub mod moderation;
/// Discord REST calls with retry
pub mod resilient;
/// Client construction and lifecycle
pub mod runner;

pub use denial_cache::DenialCache;
pub use handler::Handler;
pub use runner::run_bot;

use std::sync::Arc;

use crate::analyzer::ImageAnalyzer;
use crate::config::Settings;
use crate::storage::ModerationStore;

/// State shared by every event task
pub struct BotState {
    /// Read-only settings
    pub settings: Arc<Settings>,
    /// Attachment scoring pipeline
    pub analyzer: Arc<ImageAnalyzer>,
    /// Persisted moderation data
    pub store: Arc<ModerationStore>,
    /// Access-denied reply throttle
    pub denials: DenialCache,
}
