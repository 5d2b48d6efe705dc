#![deny(missing_docs)]
//! Image Moderator library.
//!
//! Discord event handling, image classification and moderation state for
//! the NSFW image moderation bot.

/// Fetch → preprocess → classify pipeline.
pub mod analyzer;
/// Discord transport: event handler, commands and moderation actions.
pub mod bot;
/// ONNX model wrapper and score reduction.
pub mod classifier;
/// Configuration management.
pub mod config;
/// HTTP download of attachment images.
pub mod fetcher;
/// Log output setup and secret redaction.
pub mod logging;
/// Threshold and escalation rules.
pub mod policy;
/// Image decoding and tensor layout.
pub mod preprocess;
/// Persisted moderation data.
pub mod storage;
/// Utility functions.
pub mod utils;
