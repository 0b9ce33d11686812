//! Security decision over the sifted key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bits::Bit;

/// Standard BB84 intercept-resend security bound.
pub const QBER_THRESHOLD: f64 = 0.11;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Secure,
    Compromised,
}

impl KeyStatus {
    pub fn is_secure(self) -> bool {
        matches!(self, KeyStatus::Secure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyStatus::Secure => "secure",
            KeyStatus::Compromised => "compromised",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a run: either one shared key or a compromise signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyDecision {
    pub status: KeyStatus,
    /// Sifted Alice bits when secure, empty when compromised.
    pub final_key: Vec<Bit>,
    pub qber: f64,
    pub threshold: f64,
}

/// Compares the QBER against a threshold. No reconciliation or privacy
/// amplification is applied: a secure key is the sifted key as-is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyExtractor {
    threshold: f64,
}

impl Default for KeyExtractor {
    fn default() -> Self {
        Self {
            threshold: QBER_THRESHOLD,
        }
    }
}

impl KeyExtractor {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Strict comparison: `qber == threshold` is still secure.
    pub fn decide(&self, sifted_alice: &[Bit], qber: f64) -> KeyDecision {
        let status = if qber > self.threshold {
            KeyStatus::Compromised
        } else {
            KeyStatus::Secure
        };
        let final_key = match status {
            KeyStatus::Secure => sifted_alice.to_vec(),
            KeyStatus::Compromised => Vec::new(),
        };
        KeyDecision {
            status,
            final_key,
            qber,
            threshold: self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_itself_is_secure() {
        let decision = KeyExtractor::default().decide(&[1, 0, 1], QBER_THRESHOLD);
        assert_eq!(decision.status, KeyStatus::Secure);
        assert_eq!(decision.final_key, vec![1, 0, 1]);
    }

    #[test]
    fn above_threshold_drops_the_key() {
        let decision = KeyExtractor::default().decide(&[1, 0, 1], 0.1100001);
        assert_eq!(decision.status, KeyStatus::Compromised);
        assert!(decision.final_key.is_empty());
    }

    #[test]
    fn custom_threshold_is_respected() {
        let extractor = KeyExtractor::with_threshold(0.25);
        assert!(extractor.decide(&[1], 0.2).status.is_secure());
        assert!(!extractor.decide(&[1], 0.3).status.is_secure());
    }
}
