use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The six numeric bounds of a classification policy. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBands {
    pub normal_low: f64,
    pub normal_high: f64,
    pub borderline_low: f64,
    pub borderline_high: f64,
    pub abnormal_low: f64,
    pub abnormal_high: f64,
}

impl ThresholdBands {
    /// Same bands with the Normal range replaced.
    pub fn with_normal_band(self, low: f64, high: f64) -> Self {
        Self {
            normal_low: low,
            normal_high: high,
            ..self
        }
    }
}

/// One immutable version of the system-wide threshold policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub id: Uuid,
    pub bands: ThresholdBands,
    pub effective_from: NaiveDateTime,
    pub created_at: NaiveDateTime,
}
