//! NSFW classifier backed by ONNX Runtime.
//!
//! Two output layouts are understood:
//! - a single probability in `[0, 1]`;
//! - the five-class `drawings, hentai, neutral, porn, sexy` logits, which are
//!   softmaxed and reduced to `hentai + porn + sexy`.

use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Class indices of the five-class NSFW detector.
const CLASS_HENTAI: usize = 1;
const CLASS_PORN: usize = 3;
const CLASS_SEXY: usize = 4;
const FIVE_CLASS_LEN: usize = 5;

/// Errors that can occur while loading or running the model
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Model file not found or session could not be built
    #[error("failed to load model: {0}")]
    Load(String),
    /// Input tensor rejected or session run failed
    #[error("inference failed: {0}")]
    Inference(String),
    /// Model produced an output this classifier cannot interpret
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// Anything that turns a preprocessed image into an NSFW score.
#[cfg_attr(test, mockall::automock)]
pub trait ImageClassifier: Send + Sync {
    /// Score in `[0, 1]`, rounded to three decimals.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError` if inference fails.
    fn classify(&self, input: &Array4<f32>) -> Result<f32, ClassifierError>;
}

/// ONNX Runtime session loaded once at startup.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Load the model from `path`.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::Load` if the file is missing or the session
    /// cannot be built.
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self, ClassifierError> {
        info!("Loading ONNX model from: {}", path.display());

        if !path.exists() {
            return Err(ClassifierError::Load(format!(
                "model not found: {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| ClassifierError::Load(format!("session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ClassifierError::Load(format!("optimization level: {e}")))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| ClassifierError::Load(format!("intra threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| ClassifierError::Load(format!("commit: {e}")))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ClassifierError::Load("model declares no inputs".into()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ClassifierError::Load("model declares no outputs".into()))?;

        info!(input = %input_name, output = %output_name, "ONNX model loaded successfully");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let tensor = Tensor::from_array(input.clone())
            .map_err(|e| ClassifierError::Inference(format!("tensor: {e}")))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| ClassifierError::UnexpectedOutput("missing output".into()))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::UnexpectedOutput(e.to_string()))?;

        Ok(data.to_vec())
    }
}

impl ImageClassifier for OnnxClassifier {
    fn classify(&self, input: &Array4<f32>) -> Result<f32, ClassifierError> {
        let started = Instant::now();
        let raw = self.run(input)?;
        let score = nsfw_score(&raw)?;
        debug!(
            score,
            elapsed_ms = started.elapsed().as_millis(),
            "Inference finished"
        );
        Ok(score)
    }
}

/// Reduce raw model output to a single NSFW score.
///
/// # Errors
///
/// Returns `ClassifierError::UnexpectedOutput` for lengths other than 1 or 5,
/// or for non-finite values.
pub fn nsfw_score(raw: &[f32]) -> Result<f32, ClassifierError> {
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::UnexpectedOutput(
            "non-finite value in model output".into(),
        ));
    }

    let score = match raw.len() {
        1 => raw[0].clamp(0.0, 1.0),
        FIVE_CLASS_LEN => {
            let probs = softmax(raw);
            (probs[CLASS_HENTAI] + probs[CLASS_PORN] + probs[CLASS_SEXY]).clamp(0.0, 1.0)
        }
        n => {
            return Err(ClassifierError::UnexpectedOutput(format!(
                "expected 1 or {FIVE_CLASS_LEN} values, got {n}"
            )))
        }
    };

    Ok(round3(score))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn round3(v: f32) -> f32 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_probability_passthrough() -> Result<(), ClassifierError> {
        assert!((nsfw_score(&[0.8234])? - 0.823).abs() < 1e-6);
        assert!((nsfw_score(&[1.7])? - 1.0).abs() < 1e-6);
        assert!(nsfw_score(&[-0.2])?.abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_five_class_sums_unsafe_classes() -> Result<(), ClassifierError> {
        // Equal logits → each class 0.2, three unsafe classes → 0.6
        let score = nsfw_score(&[1.0, 1.0, 1.0, 1.0, 1.0])?;
        assert!((score - 0.6).abs() < 1e-6);

        // Neutral dominates
        let score = nsfw_score(&[0.0, 0.0, 20.0, 0.0, 0.0])?;
        assert!(score < 0.001);

        // Porn dominates
        let score = nsfw_score(&[0.0, 0.0, 0.0, 20.0, 0.0])?;
        assert!(score > 0.999);
        Ok(())
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() -> Result<(), ClassifierError> {
        let score = nsfw_score(&[1000.0, 1000.0, 1000.0, 1000.0, 1000.0])?;
        assert!((score - 0.6).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_layouts() {
        assert!(nsfw_score(&[]).is_err());
        assert!(nsfw_score(&[0.1, 0.9]).is_err());
        assert!(nsfw_score(&[f32::NAN]).is_err());
    }

    #[test]
    fn test_missing_model_file() {
        let result = OnnxClassifier::load(Path::new("/nonexistent/nsfw_model.onnx"), 1);
        assert!(matches!(result, Err(ClassifierError::Load(_))));
    }
}
