//! Attachment analysis: download, preprocess, classify.

use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::classifier::{ClassifierError, ImageClassifier};
use crate::config::{SCORE_CACHE_MAX_SIZE, SCORE_CACHE_TTL_SECS};
use crate::fetcher::{FetchError, ImageSource};
use crate::preprocess::{preprocess, PreprocessError};

/// Errors that can occur while scoring an attachment
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Download failed
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Payload is not a decodable image
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    /// Model run failed
    #[error(transparent)]
    Classify(#[from] ClassifierError),
    /// Blocking inference task panicked or was cancelled
    #[error("inference task failed: {0}")]
    Task(String),
}

/// Scores attachment URLs, remembering scores of identical images.
pub struct ImageAnalyzer {
    source: Arc<dyn ImageSource>,
    classifier: Arc<dyn ImageClassifier>,
    scores: Cache<[u8; 32], f32>,
}

impl ImageAnalyzer {
    /// Create an analyzer from a downloader and a classifier
    #[must_use]
    pub fn new(source: Arc<dyn ImageSource>, classifier: Arc<dyn ImageClassifier>) -> Self {
        let scores = Cache::builder()
            .max_capacity(SCORE_CACHE_MAX_SIZE)
            .time_to_live(Duration::from_secs(SCORE_CACHE_TTL_SECS))
            .build();

        Self {
            source,
            classifier,
            scores,
        }
    }

    /// NSFW score of the image at `url`.
    ///
    /// `mime_hint` is the content type Discord reported for the attachment;
    /// it is used when the server omits `Content-Type`.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError` if any stage fails. Callers skip the
    /// attachment in that case.
    pub async fn analyze(&self, url: &str, mime_hint: Option<&str>) -> Result<f32, AnalysisError> {
        let fetched = self.source.fetch(url).await?;
        let digest: [u8; 32] = Sha256::digest(&fetched.bytes).into();

        if let Some(score) = self.scores.get(&digest).await {
            debug!(score, "Score cache hit");
            return Ok(score);
        }

        let mime = fetched
            .content_type
            .or_else(|| mime_hint.map(ToString::to_string));
        let classifier = Arc::clone(&self.classifier);
        let bytes = fetched.bytes;

        let score = tokio::task::spawn_blocking(move || -> Result<f32, AnalysisError> {
            let input = preprocess(&bytes, mime.as_deref())?;
            Ok(classifier.classify(&input)?)
        })
        .await
        .map_err(|e| AnalysisError::Task(e.to_string()))??;

        self.scores.insert(digest, score).await;
        Ok(score)
    }

    /// Number of cached scores
    #[must_use]
    pub fn cached_scores(&self) -> u64 {
        self.scores.entry_count()
    }
}
