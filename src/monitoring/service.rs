//! Reading ingest and the per-reading background fan-out.
//!
//! `record_reading` categorizes and stores synchronously (from the caller's
//! point of view), then hands abnormal readings to `on_reading_created`, which
//! runs the alert engine and the pattern miner concurrently on blocking
//! threads. Each job opens its own connection; a failure in one never affects
//! the other or the stored reading.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::alerts::{AlertEngine, AlertOutcome};
use super::categorize::categorize;
use super::delivery::{DeliveryReport, SpecialistDeliveryTracker};
use super::error::MonitorError;
use super::notify::NotificationDispatcher;
use super::patterns::{MiningOutcome, PatternMiner};
use super::thresholds::{self, ThresholdResolver};
use super::tokenizer::Tokenizer;
use crate::config::MonitorConfig;
use crate::db::repository::{
    assign_specialist, delete_reading, get_reading, insert_patient, insert_reading,
    insert_specialist, update_reading_value,
};
use crate::db::sqlite::MonitorDb;
use crate::db::DatabaseError;
use crate::models::{
    AlertSummary, Category, NewReading, Patient, PatientOverride, Reading, Specialist,
    SpecialistAssignment, ThresholdBands, ThresholdPolicy,
};

/// Outcome of both background jobs for one abnormal reading.
#[derive(Debug)]
pub struct FanOutReport {
    pub reading_id: Uuid,
    pub alert: Result<AlertOutcome, MonitorError>,
    pub mining: Result<MiningOutcome, MonitorError>,
}

/// A stored reading plus the handle of its background work, if any was started.
#[derive(Debug)]
pub struct RecordedReading {
    pub reading: Reading,
    pub fan_out: Option<JoinHandle<FanOutReport>>,
}

#[derive(Clone)]
pub struct MonitorService {
    db: MonitorDb,
    resolver: ThresholdResolver,
    alerts: Arc<AlertEngine>,
    miner: Arc<PatternMiner>,
    delivery: Arc<SpecialistDeliveryTracker>,
}

impl MonitorService {
    pub fn new(
        db: MonitorDb,
        config: MonitorConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            db,
            resolver: ThresholdResolver::new(),
            alerts: Arc::new(AlertEngine::new(config.clone(), dispatcher.clone())),
            miner: Arc::new(PatternMiner::new(config.clone(), tokenizer)),
            delivery: Arc::new(SpecialistDeliveryTracker::new(config, dispatcher)),
        }
    }

    pub fn db(&self) -> &MonitorDb {
        &self.db
    }

    // ── Configuration & registry ───────────────────────────

    pub fn publish_policy(
        &self,
        bands: ThresholdBands,
        effective_from: NaiveDateTime,
    ) -> Result<ThresholdPolicy, MonitorError> {
        let conn = self.db.open()?;
        thresholds::publish_policy(&conn, bands, effective_from)
    }

    pub fn register_patient(
        &self,
        name: &str,
        email: Option<&str>,
        threshold_override: PatientOverride,
    ) -> Result<Patient, MonitorError> {
        if name.trim().is_empty() {
            return Err(MonitorError::Validation("patient name is required".into()));
        }
        thresholds::validate_override(&threshold_override)?;
        let patient = Patient {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: email.map(String::from),
            threshold_override,
            created_at: Utc::now().naive_utc(),
        };
        insert_patient(&self.db.open()?, &patient)?;
        tracing::info!(patient_id = %patient.id, "Patient registered");
        Ok(patient)
    }

    pub fn set_patient_override(
        &self,
        patient_id: &Uuid,
        value: &PatientOverride,
    ) -> Result<(), MonitorError> {
        thresholds::set_override(&self.db.open()?, patient_id, value)
    }

    pub fn register_specialist(
        &self,
        name: &str,
        email: Option<&str>,
    ) -> Result<Specialist, MonitorError> {
        if name.trim().is_empty() {
            return Err(MonitorError::Validation("specialist name is required".into()));
        }
        let specialist = Specialist {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: email.map(String::from),
            created_at: Utc::now().naive_utc(),
        };
        insert_specialist(&self.db.open()?, &specialist)?;
        tracing::info!(specialist_id = %specialist.id, "Specialist registered");
        Ok(specialist)
    }

    pub fn assign_specialist(
        &self,
        patient_id: &Uuid,
        specialist_id: &Uuid,
    ) -> Result<SpecialistAssignment, MonitorError> {
        let assignment = SpecialistAssignment {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            specialist_id: *specialist_id,
            assigned_at: Utc::now().naive_utc(),
        };
        assign_specialist(&self.db.open()?, &assignment)?;
        tracing::info!(patient_id = %patient_id, specialist_id = %specialist_id, "Specialist assigned");
        Ok(assignment)
    }

    // ── Readings ───────────────────────────────────────────

    /// Validate, categorize and store a reading, then start its fan-out.
    ///
    /// Errors here (validation, missing policy, storage) reject the reading.
    /// Fan-out failures only show up in the returned handle and the logs.
    pub async fn record_reading(&self, input: NewReading) -> Result<RecordedReading, MonitorError> {
        let now = Utc::now().naive_utc();
        validate_reading(&input, now)?;

        let db = self.db.clone();
        let resolver = self.resolver;
        let reading = blocking(move || -> Result<Reading, MonitorError> {
            let conn = db.open()?;
            let policy = resolver.resolve_at(&conn, &input.patient_id, now)?;
            let reading = Reading {
                id: Uuid::new_v4(),
                patient_id: input.patient_id,
                taken_at: input.taken_at,
                value: input.value,
                unit: input.unit.trim().to_string(),
                food_tags: input.food_tags,
                activity_tags: input.activity_tags,
                event: input.event,
                symptom_tags: input.symptom_tags,
                free_notes: input.free_notes,
                category: categorize(input.value, &policy),
                created_at: now,
            };
            insert_reading(&conn, &reading)?;
            Ok(reading)
        })
        .await?;

        tracing::info!(
            reading_id = %reading.id,
            patient_id = %reading.patient_id,
            category = reading.category.as_str(),
            "Reading recorded"
        );

        let fan_out = self.on_reading_created(&reading);
        Ok(RecordedReading { reading, fan_out })
    }

    /// Edit a reading's value. The category is recomputed against the
    /// current policy. No fan-out runs for an edit; the next abnormal
    /// reading's evaluation counts the edited reading.
    pub async fn update_reading_value(
        &self,
        reading_id: Uuid,
        patient_id: Uuid,
        value: f64,
    ) -> Result<Reading, MonitorError> {
        if !value.is_finite() {
            return Err(MonitorError::Validation("reading value must be finite".into()));
        }

        let db = self.db.clone();
        let resolver = self.resolver;
        let reading = blocking(move || -> Result<Reading, MonitorError> {
            let conn = db.open()?;
            let mut reading = owned_reading(&conn, &reading_id, &patient_id)?;
            let policy = resolver.resolve(&conn, &patient_id)?;
            let category = categorize(value, &policy);
            update_reading_value(&conn, &reading_id, value, category)?;
            reading.value = value;
            reading.category = category;
            Ok(reading)
        })
        .await?;

        tracing::info!(
            reading_id = %reading.id,
            category = reading.category.as_str(),
            "Reading value updated"
        );
        Ok(reading)
    }

    pub fn delete_reading(&self, reading_id: &Uuid, patient_id: &Uuid) -> Result<(), MonitorError> {
        delete_reading(&self.db.open()?, reading_id, patient_id)?;
        tracing::info!(reading_id = %reading_id, "Reading deleted");
        Ok(())
    }

    /// Start the alert and mining jobs for a freshly stored reading.
    ///
    /// Returns `None` for non-abnormal readings. Must be called from within a
    /// tokio runtime.
    pub fn on_reading_created(&self, reading: &Reading) -> Option<JoinHandle<FanOutReport>> {
        if reading.category != Category::Abnormal {
            return None;
        }

        let reading_id = reading.id;
        let patient_id = reading.patient_id;
        let alert_db = self.db.clone();
        let mining_db = self.db.clone();
        let alerts = self.alerts.clone();
        let miner = self.miner.clone();

        Some(tokio::spawn(async move {
            let (alert, mining) = tokio::join!(
                run_stage("alert", patient_id, alert_db, move |conn| {
                    alerts.evaluate(conn, &patient_id)
                }),
                run_stage("mining", patient_id, mining_db, move |conn| {
                    miner.analyze(conn, &patient_id)
                }),
            );
            FanOutReport {
                reading_id,
                alert,
                mining,
            }
        }))
    }

    // ── Specialist sessions ────────────────────────────────

    pub fn get_pending_alerts(&self, specialist_id: &Uuid) -> Result<Vec<AlertSummary>, MonitorError> {
        self.delivery.get_pending_alerts(&self.db.open()?, specialist_id)
    }

    pub fn mark_delivered(&self, alert_id: &Uuid, specialist_id: &Uuid) -> Result<bool, MonitorError> {
        self.delivery.mark_delivered(&self.db.open()?, alert_id, specialist_id)
    }

    /// Called when a specialist becomes reachable.
    pub async fn deliver_pending(&self, specialist_id: Uuid) -> Result<DeliveryReport, MonitorError> {
        let db = self.db.clone();
        let delivery = self.delivery.clone();
        blocking(move || {
            let conn = db.open()?;
            delivery.deliver_pending(&conn, &specialist_id)
        })
        .await
    }
}

fn validate_reading(input: &NewReading, now: NaiveDateTime) -> Result<(), MonitorError> {
    if !input.value.is_finite() {
        return Err(MonitorError::Validation("reading value must be finite".into()));
    }
    if input.unit.trim().is_empty() {
        return Err(MonitorError::Validation("reading unit is required".into()));
    }
    if input.taken_at > now {
        return Err(MonitorError::Validation("reading cannot be taken in the future".into()));
    }
    Ok(())
}

fn owned_reading(conn: &Connection, reading_id: &Uuid, patient_id: &Uuid) -> Result<Reading, MonitorError> {
    match get_reading(conn, reading_id)? {
        Some(reading) if reading.patient_id == *patient_id => Ok(reading),
        _ => Err(DatabaseError::NotFound {
            entity_type: "reading".into(),
            id: reading_id.to_string(),
        }
        .into()),
    }
}

/// Run blocking work off the async executor.
async fn blocking<T, F>(job: F) -> Result<T, MonitorError>
where
    F: FnOnce() -> Result<T, MonitorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| MonitorError::BackgroundTask(e.to_string()))?
}

/// One isolated fan-out job with its own connection. Failures are logged here.
async fn run_stage<T, F>(
    stage: &'static str,
    patient_id: Uuid,
    db: MonitorDb,
    job: F,
) -> Result<T, MonitorError>
where
    F: FnOnce(&Connection) -> Result<T, MonitorError> + Send + 'static,
    T: Send + 'static,
{
    let result = blocking(move || {
        let conn = db.open()?;
        job(&conn)
    })
    .await;

    if let Err(e) = &result {
        tracing::error!(stage, patient_id = %patient_id, error = %e, "Background stage failed");
    }
    result
}
