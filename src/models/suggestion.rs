use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{PatternStrength, TimeBucket};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub content: String,
    pub based_on_pattern: String,
    pub strength: PatternStrength,
    pub generated_at: NaiveDateTime,
}

/// Occurrence counts per time-of-day bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub morning: u32,
    pub lunch: u32,
    pub afternoon: u32,
    pub evening: u32,
}

impl BucketCounts {
    pub fn get(&self, bucket: TimeBucket) -> u32 {
        match bucket {
            TimeBucket::Morning => self.morning,
            TimeBucket::Lunch => self.lunch,
            TimeBucket::Afternoon => self.afternoon,
            TimeBucket::Evening => self.evening,
        }
    }

    pub fn increment(&mut self, bucket: TimeBucket) {
        let slot = match bucket {
            TimeBucket::Morning => &mut self.morning,
            TimeBucket::Lunch => &mut self.lunch,
            TimeBucket::Afternoon => &mut self.afternoon,
            TimeBucket::Evening => &mut self.evening,
        };
        *slot += 1;
    }

    /// Bucket with the highest count; ties go to the earlier-declared bucket.
    pub fn peak(&self) -> TimeBucket {
        let mut best = TimeBucket::Morning;
        for bucket in TimeBucket::ALL {
            if self.get(bucket) > self.get(best) {
                best = bucket;
            }
        }
        best
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStats {
    /// Number of distinct abnormal readings mentioning the token.
    pub occurrences: u32,
    pub timing: BucketCounts,
}

/// Mined token statistics, as stored in a pattern snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyMap {
    pub total_abnormal: u32,
    pub tokens: BTreeMap<String, TokenStats>,
}

/// Point-in-time audit record of one mining run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub generated_at: NaiveDateTime,
    pub item_frequency_map: FrequencyMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_prefers_highest_count() {
        let counts = BucketCounts {
            morning: 1,
            lunch: 0,
            afternoon: 3,
            evening: 2,
        };
        assert_eq!(counts.peak(), TimeBucket::Afternoon);
    }

    #[test]
    fn peak_ties_resolve_in_declaration_order() {
        let counts = BucketCounts {
            morning: 0,
            lunch: 2,
            afternoon: 0,
            evening: 2,
        };
        assert_eq!(counts.peak(), TimeBucket::Lunch);
        assert_eq!(BucketCounts::default().peak(), TimeBucket::Morning);
    }

    #[test]
    fn increment_targets_one_bucket() {
        let mut counts = BucketCounts::default();
        counts.increment(TimeBucket::Evening);
        counts.increment(TimeBucket::Evening);
        assert_eq!(counts.get(TimeBucket::Evening), 2);
        assert_eq!(counts.get(TimeBucket::Morning), 0);
    }
}
