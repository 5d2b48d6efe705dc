use dotenvy::dotenv;
use image_moderator::analyzer::ImageAnalyzer;
use image_moderator::bot::{run_bot, BotState, DenialCache};
use image_moderator::classifier::OnnxClassifier;
use image_moderator::config::{
    get_denial_cache_max_size, get_denial_cache_ttl, get_denial_cooldown, Settings,
};
use image_moderator::fetcher::HttpImageSource;
use image_moderator::logging::{init_logging, RedactionPatterns};
use image_moderator::storage::ModerationStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Image Moderator...");

    let settings = init_settings();
    let analyzer = init_analyzer(&settings);
    let store = init_store(&settings).await;
    let denials = init_denial_cache();

    let state = Arc::new(BotState {
        settings,
        analyzer,
        store,
        denials,
    });

    if let Err(e) = run_bot(state).await {
        error!("Bot stopped: {:#}", e);
        std::process::exit(1);
    }

    info!("Shutdown complete.");
    Ok(())
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!(
                "Configuration loaded successfully (threshold: {}, prefix: {:?}).",
                s.nsfw_threshold, s.command_prefix
            );
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_analyzer(settings: &Settings) -> Arc<ImageAnalyzer> {
    let classifier = match OnnxClassifier::load(&settings.model_path, settings.inference_threads) {
        Ok(c) => {
            info!("ONNX model loaded from {}.", settings.model_path.display());
            c
        }
        Err(e) => {
            error!("Failed to load ONNX model: {}", e);
            std::process::exit(1);
        }
    };

    let source = match HttpImageSource::new(
        Duration::from_secs(settings.fetch_timeout_secs),
        settings.max_image_bytes,
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    Arc::new(ImageAnalyzer::new(Arc::new(source), Arc::new(classifier)))
}

async fn init_store(settings: &Settings) -> Arc<ModerationStore> {
    match ModerationStore::load(settings.data_file.clone()).await {
        Ok(s) => {
            info!(
                "Moderation data loaded from {} ({} servers enabled).",
                s.path().display(),
                s.enabled_count().await
            );
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load moderation data: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_denial_cache() -> DenialCache {
    let cooldown = get_denial_cooldown();
    let ttl = get_denial_cache_ttl();
    let max_size = get_denial_cache_max_size();

    info!(
        "Initializing DenialCache (cooldown: {}s, ttl: {}s, max_size: {})",
        cooldown, ttl, max_size
    );

    DenialCache::new(cooldown, ttl, max_size)
}
