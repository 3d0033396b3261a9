//! 推理判定规则：概率 → 标签 + 置信度档位
//!
//! This is a fixed post-processing rule, not a calibrated one:
//! - label is `fake` only when the probability is strictly above 0.5;
//! - confidence comes from the distance to 0.5: above `high` → high,
//!   above `medium` → medium, otherwise low.

use serde::{Deserialize, Serialize};

pub const DECISION_BOUNDARY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Real,
    Fake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            medium: 0.15,
            high: 0.35,
        }
    }
}

impl ConfidenceThresholds {
    pub fn tier(&self, probability: f64) -> Confidence {
        let distance = (probability - DECISION_BOUNDARY).abs();
        if distance > self.high {
            Confidence::High
        } else if distance > self.medium {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    pub probability: f64,
    pub confidence: Confidence,
}

impl Verdict {
    pub fn from_probability(probability: f64, thresholds: &ConfidenceThresholds) -> Self {
        let label = if probability > DECISION_BOUNDARY {
            Label::Fake
        } else {
            Label::Real
        };
        Self {
            label,
            probability: round4(probability),
            confidence: thresholds.tier(probability),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
