//! Versioned threshold policies and per-patient resolution.
//!
//! Policies form an append-only history. The policy in force at time `t` is
//! the version with the latest `effective_from <= t`; versions sharing an
//! `effective_from` resolve to the one inserted last.

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::error::MonitorError;
use crate::db::repository::{
    get_patient_override, insert_threshold_policy, load_threshold_policies, set_patient_override,
};
use crate::db::DatabaseError;
use crate::models::{PatientOverride, ThresholdBands, ThresholdPolicy};

/// Ordered, immutable sequence of policy versions.
#[derive(Debug, Clone, Default)]
pub struct PolicyHistory {
    versions: Vec<ThresholdPolicy>,
}

impl PolicyHistory {
    /// Build from versions in insertion order. The sort is stable, so ties on
    /// `effective_from` keep insertion order.
    pub fn new(mut versions: Vec<ThresholdPolicy>) -> Self {
        versions.sort_by_key(|p| p.effective_from);
        Self { versions }
    }

    pub fn load(conn: &Connection) -> Result<Self, DatabaseError> {
        Ok(Self::new(load_threshold_policies(conn)?))
    }

    /// The policy in force at `at`, if any version had started by then.
    pub fn current_as_of(&self, at: NaiveDateTime) -> Option<&ThresholdPolicy> {
        self.versions.iter().rev().find(|p| p.effective_from <= at)
    }

    pub fn versions(&self) -> &[ThresholdPolicy] {
        &self.versions
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Check the band ordering a policy must satisfy before it is stored.
pub fn validate_bands(bands: &ThresholdBands) -> Result<(), MonitorError> {
    let all = [
        bands.normal_low,
        bands.normal_high,
        bands.borderline_low,
        bands.borderline_high,
        bands.abnormal_low,
        bands.abnormal_high,
    ];
    if all.iter().any(|v| !v.is_finite()) {
        return Err(MonitorError::Validation("threshold bounds must be finite".into()));
    }
    if bands.normal_low >= bands.normal_high {
        return Err(MonitorError::Validation("normal_low must be below normal_high".into()));
    }
    if bands.normal_high > bands.borderline_low {
        return Err(MonitorError::Validation(
            "normal_high must not exceed borderline_low".into(),
        ));
    }
    if bands.borderline_low >= bands.borderline_high {
        return Err(MonitorError::Validation(
            "borderline_low must be below borderline_high".into(),
        ));
    }
    if bands.abnormal_low >= bands.abnormal_high {
        return Err(MonitorError::Validation("abnormal_low must be below abnormal_high".into()));
    }
    if bands.abnormal_high < bands.borderline_high {
        return Err(MonitorError::Validation(
            "abnormal_high must cover borderline_high".into(),
        ));
    }
    Ok(())
}

/// A Normal-band override must be either fully set or fully cleared.
pub fn validate_override(value: &PatientOverride) -> Result<(), MonitorError> {
    match (value.normal_low, value.normal_high) {
        (None, None) => Ok(()),
        (Some(low), Some(high)) if low.is_finite() && high.is_finite() && low < high => Ok(()),
        (Some(_), Some(_)) => Err(MonitorError::Validation(
            "override normal_low must be below normal_high".into(),
        )),
        _ => Err(MonitorError::Validation(
            "override needs both normal_low and normal_high".into(),
        )),
    }
}

/// Write path for policies: validate, then append a new version.
pub fn publish_policy(
    conn: &Connection,
    bands: ThresholdBands,
    effective_from: NaiveDateTime,
) -> Result<ThresholdPolicy, MonitorError> {
    validate_bands(&bands)?;
    let policy = ThresholdPolicy {
        id: Uuid::new_v4(),
        bands,
        effective_from,
        created_at: Utc::now().naive_utc(),
    };
    insert_threshold_policy(conn, &policy)?;
    tracing::info!(
        policy_id = %policy.id,
        effective_from = %policy.effective_from,
        "Threshold policy version published"
    );
    Ok(policy)
}

/// Clinical-staff action: set or clear a patient's Normal band.
pub fn set_override(
    conn: &Connection,
    patient_id: &Uuid,
    value: &PatientOverride,
) -> Result<(), MonitorError> {
    validate_override(value)?;
    set_patient_override(conn, patient_id, value)?;
    tracing::info!(patient_id = %patient_id, cleared = value.normal_band().is_none(), "Patient override updated");
    Ok(())
}

/// Resolves the bands that apply to one patient.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdResolver;

impl ThresholdResolver {
    pub fn new() -> Self {
        Self
    }

    /// Effective policy for the patient right now.
    pub fn resolve(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
    ) -> Result<ThresholdPolicy, MonitorError> {
        self.resolve_at(conn, patient_id, Utc::now().naive_utc())
    }

    /// Effective policy for the patient as of `at`.
    ///
    /// A fully specified override replaces only the Normal band; the
    /// Borderline and Abnormal bands always come from the system policy.
    pub fn resolve_at(
        &self,
        conn: &Connection,
        patient_id: &Uuid,
        at: NaiveDateTime,
    ) -> Result<ThresholdPolicy, MonitorError> {
        let history = PolicyHistory::load(conn)?;
        let system = history
            .current_as_of(at)
            .cloned()
            .ok_or(MonitorError::ConfigurationMissing)?;

        let patient_override = get_patient_override(conn, patient_id)?;
        match patient_override.normal_band() {
            Some((low, high)) => {
                tracing::debug!(patient_id = %patient_id, low, high, "Applying patient normal-band override");
                Ok(ThresholdPolicy {
                    bands: system.bands.with_normal_band(low, high),
                    ..system
                })
            }
            None => Ok(system),
        }
    }
}
