//! Moderation policy: when an image is a violation and how long the
//! offender is timed out.

use std::time::Duration;

/// Returns `true` when `score` meets or exceeds `threshold`.
///
/// NaN scores never count as violations.
#[must_use]
pub fn is_violation(score: f32, threshold: f32) -> bool {
    score >= threshold
}

/// Timeout ladder indexed by warning count.
pub struct Escalation;

impl Escalation {
    /// Warning count from which the maximum timeout applies.
    pub const MAX_LEVEL: u32 = 4;

    const LEVELS: [Duration; 4] = [
        Duration::from_secs(10 * 60),
        Duration::from_secs(60 * 60),
        Duration::from_secs(3 * 60 * 60),
        Duration::from_secs(6 * 60 * 60),
    ];

    /// Timeout for a user who now has `warning_count` warnings.
    ///
    /// A count of zero is treated as a first offence.
    #[must_use]
    pub fn timeout_for(warning_count: u32) -> Duration {
        let level = warning_count.clamp(1, Self::MAX_LEVEL);
        Self::LEVELS[(level - 1) as usize]
    }

    /// Whether the user sits at the top of the ladder.
    #[must_use]
    pub const fn is_max(warning_count: u32) -> bool {
        warning_count >= Self::MAX_LEVEL
    }
}

/// Human-readable duration: `"3h 0m"` or `"10m"`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
