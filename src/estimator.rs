//! Local token estimation
//!
//! A deterministic character-count approximation used whenever remote
//! validation is disabled, unavailable, or has failed. The heuristic lives
//! behind [`TokenEstimator`] so the estimation model can be swapped without
//! touching the orchestrator.

use crate::config::get_config;

/// Pluggable local estimation strategy.
pub trait TokenEstimator: Send + Sync {
    /// Approximate the token count of `text`. Must be deterministic and
    /// return 0 for empty input.
    fn estimate(&self, text: &str) -> u64;
}

/// Character-ratio estimator: ceil(chars / ratio), default 4 characters per
/// token, which tracks Claude tokenization closely enough for gap analysis.
#[derive(Debug, Clone)]
pub struct CharTokenEstimator {
    chars_per_token: f64,
}

impl CharTokenEstimator {
    pub fn new(chars_per_token: f64) -> Self {
        // A non-positive ratio would divide by zero; validation in config
        // rejects it, but guard construction from other callers too.
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            4.0
        };
        Self { chars_per_token }
    }

    pub fn from_config() -> Self {
        Self::new(get_config().analysis.chars_per_token)
    }
}

impl Default for CharTokenEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenEstimator for CharTokenEstimator {
    fn estimate(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(CharTokenEstimator::default().estimate(""), 0);
    }

    #[test]
    fn test_default_ratio() {
        let est = CharTokenEstimator::default();
        assert_eq!(est.estimate("abcd"), 1);
        assert_eq!(est.estimate("abcde"), 2);
        assert_eq!(est.estimate(&"x".repeat(300)), 75);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let est = CharTokenEstimator::default();
        // 4 multi-byte characters, one token
        assert_eq!(est.estimate("日本語字"), 1);
    }

    #[test]
    fn test_deterministic() {
        let est = CharTokenEstimator::default();
        let text = "some representative message text";
        let first = est.estimate(text);
        for _ in 0..5 {
            assert_eq!(est.estimate(text), first);
        }
    }

    #[test]
    fn test_bad_ratio_falls_back() {
        let est = CharTokenEstimator::new(0.0);
        assert_eq!(est.estimate("abcd"), 1);
    }
}
