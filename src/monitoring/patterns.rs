//! Frequency mining over the free-text annotations of abnormal readings.
//!
//! Deterministic heuristic: a token is a pattern when it appears in enough
//! distinct abnormal readings, both in absolute count and as a share of all
//! abnormal readings. Each run appends a snapshot of the token statistics and
//! one suggestion per pattern.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MonitorError;
use super::tokenizer::Tokenizer;
use crate::config::MonitorConfig;
use crate::db::repository::{get_readings_for_patient, insert_pattern_snapshot, insert_suggestion};
use crate::models::{
    Category, FrequencyMap, PatternSnapshot, PatternStrength, Reading, Suggestion, TimeBucket,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiningSkipReason {
    InsufficientData,
}

impl MiningSkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MiningSkipReason::InsufficientData => "insufficient_data",
        }
    }
}

#[derive(Debug, Clone)]
pub enum MiningOutcome {
    Skipped(MiningSkipReason),
    Completed {
        /// Tokens that passed the frequency rule.
        patterns_found: usize,
        /// Suggestions actually persisted.
        suggestions_created: usize,
        suggestions: Vec<Suggestion>,
    },
}

/// A token that passed the frequency rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub token: String,
    pub occurrences: u32,
    pub total_abnormal: u32,
    pub share: f64,
    pub timing: TimeBucket,
    pub strength: PatternStrength,
}

impl Pattern {
    pub fn percent(&self) -> u32 {
        (self.share * 100.0).round() as u32
    }

    pub fn based_on(&self) -> String {
        format!("{} ({}/{} times)", self.token, self.occurrences, self.total_abnormal)
    }

    pub fn message(&self) -> String {
        let timing = timing_phrase(self.timing);
        match self.strength {
            PatternStrength::Strong => format!(
                "\"{}\" appears in {}% of your abnormal readings, usually {}. \
                 Consider avoiding or reducing {} to see if your readings improve.",
                self.token,
                self.percent(),
                timing,
                self.token
            ),
            PatternStrength::Moderate => format!(
                "\"{}\" appears in {}% of your abnormal readings, usually {}. \
                 Try portion control or adjusting the timing of {}.",
                self.token,
                self.percent(),
                timing,
                self.token
            ),
        }
    }
}

fn timing_phrase(bucket: TimeBucket) -> &'static str {
    match bucket {
        TimeBucket::Morning => "in the morning",
        TimeBucket::Lunch => "around lunch",
        TimeBucket::Afternoon => "in the afternoon",
        TimeBucket::Evening => "in the evening",
    }
}

/// Per-token statistics over abnormal readings.
///
/// Non-abnormal readings are ignored. A token counts at most once per reading
/// no matter how many fields mention it.
pub fn build_frequency_map(readings: &[Reading], tokenizer: &dyn Tokenizer) -> FrequencyMap {
    let mut map = FrequencyMap::default();
    for reading in readings.iter().filter(|r| r.category == Category::Abnormal) {
        map.total_abnormal += 1;
        let bucket = TimeBucket::from_hour(reading.taken_at.hour());

        let tokens: BTreeSet<String> = reading
            .annotation_fields()
            .into_iter()
            .flatten()
            .flat_map(|text| tokenizer.tokenize(text))
            .collect();

        for token in tokens {
            let stats = map.tokens.entry(token).or_default();
            stats.occurrences += 1;
            stats.timing.increment(bucket);
        }
    }
    map
}

/// Tokens passing both the occurrence and share thresholds, ranked by
/// occurrences (descending) then token.
pub fn find_patterns(map: &FrequencyMap, config: &MonitorConfig) -> Vec<Pattern> {
    if map.total_abnormal == 0 {
        return Vec::new();
    }
    let total = f64::from(map.total_abnormal);

    let mut patterns: Vec<Pattern> = map
        .tokens
        .iter()
        .filter_map(|(token, stats)| {
            let share = f64::from(stats.occurrences) / total;
            if stats.occurrences < config.min_token_occurrences || share < config.min_token_share {
                return None;
            }
            let strength = if share >= config.strong_token_share {
                PatternStrength::Strong
            } else {
                PatternStrength::Moderate
            };
            Some(Pattern {
                token: token.clone(),
                occurrences: stats.occurrences,
                total_abnormal: map.total_abnormal,
                share,
                timing: stats.timing.peak(),
                strength,
            })
        })
        .collect();

    // BTreeMap iteration is already token-ordered; the sort is stable.
    patterns.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    patterns
}

pub struct PatternMiner {
    config: MonitorConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl PatternMiner {
    pub fn new(config: MonitorConfig, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { config, tokenizer }
    }

    pub fn analyze(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<MiningOutcome, MonitorError> {
        self.analyze_at(conn, patient_id, Utc::now().naive_utc())
    }

    /// Mine all of the patient's abnormal readings.
    ///
    /// Only the initial read is fatal. Snapshot and suggestion inserts that
    /// fail are logged and skipped.
    pub fn analyze_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        now: NaiveDateTime,
    ) -> Result<MiningOutcome, MonitorError> {
        let readings = get_readings_for_patient(conn, patient_id)?;
        let abnormal = readings
            .iter()
            .filter(|r| r.category == Category::Abnormal)
            .count();
        if abnormal < self.config.min_abnormal_for_mining {
            tracing::debug!(patient_id = %patient_id, abnormal, "Not enough abnormal readings to mine");
            return Ok(MiningOutcome::Skipped(MiningSkipReason::InsufficientData));
        }

        let map = build_frequency_map(&readings, self.tokenizer.as_ref());
        let patterns = find_patterns(&map, &self.config);

        let snapshot = PatternSnapshot {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            generated_at: now,
            item_frequency_map: map,
        };
        if let Err(e) = insert_pattern_snapshot(conn, &snapshot) {
            tracing::warn!(patient_id = %patient_id, error = %e, "Pattern snapshot not saved");
        }

        let mut suggestions = Vec::with_capacity(patterns.len());
        for pattern in &patterns {
            let suggestion = Suggestion {
                id: Uuid::new_v4(),
                patient_id: *patient_id,
                content: pattern.message(),
                based_on_pattern: pattern.based_on(),
                strength: pattern.strength,
                generated_at: now,
            };
            match insert_suggestion(conn, &suggestion) {
                Ok(()) => suggestions.push(suggestion),
                Err(e) => tracing::warn!(
                    patient_id = %patient_id,
                    token = %pattern.token,
                    error = %e,
                    "Suggestion not saved"
                ),
            }
        }

        tracing::info!(
            patient_id = %patient_id,
            total_abnormal = snapshot.item_frequency_map.total_abnormal,
            patterns_found = patterns.len(),
            suggestions_created = suggestions.len(),
            "Pattern mining complete"
        );

        Ok(MiningOutcome::Completed {
            patterns_found: patterns.len(),
            suggestions_created: suggestions.len(),
            suggestions,
        })
    }
}
