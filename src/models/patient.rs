use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-patient replacement of the Normal band. Only applies when both bounds are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientOverride {
    pub normal_low: Option<f64>,
    pub normal_high: Option<f64>,
}

impl PatientOverride {
    pub fn new(normal_low: f64, normal_high: f64) -> Self {
        Self {
            normal_low: Some(normal_low),
            normal_high: Some(normal_high),
        }
    }

    /// The overriding Normal band, if fully specified.
    pub fn normal_band(&self) -> Option<(f64, f64)> {
        match (self.normal_low, self.normal_high) {
            (Some(low), Some(high)) => Some((low, high)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub threshold_override: PatientOverride,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specialist {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub created_at: NaiveDateTime,
}

/// One row of a patient's assignment history. The latest row is current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistAssignment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub specialist_id: Uuid,
    pub assigned_at: NaiveDateTime,
}
