use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Category;

/// A single health-metric sample, categorized when it was stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub taken_at: NaiveDateTime,
    pub value: f64,
    pub unit: String,
    pub food_tags: Option<String>,
    pub activity_tags: Option<String>,
    pub event: Option<String>,
    pub symptom_tags: Option<String>,
    pub free_notes: Option<String>,
    pub category: Category,
    pub created_at: NaiveDateTime,
}

impl Reading {
    /// Free-text fields scanned by pattern mining.
    pub fn annotation_fields(&self) -> [Option<&str>; 5] {
        [
            self.food_tags.as_deref(),
            self.activity_tags.as_deref(),
            self.event.as_deref(),
            self.symptom_tags.as_deref(),
            self.free_notes.as_deref(),
        ]
    }
}

/// Input for the ingest path. The category is computed, never supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewReading {
    pub patient_id: Uuid,
    pub taken_at: NaiveDateTime,
    pub value: f64,
    pub unit: String,
    pub food_tags: Option<String>,
    pub activity_tags: Option<String>,
    pub event: Option<String>,
    pub symptom_tags: Option<String>,
    pub free_notes: Option<String>,
}
