//! Error taxonomy for the monitoring engines.
//!
//! Categorization errors block reading creation. Everything raised by the
//! alert, mining and delivery side channel is logged by the fan-out and never
//! reaches the caller that stored the reading.

use thiserror::Error;
use uuid::Uuid;

use super::notify::NotificationError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("No threshold policy is in effect")]
    ConfigurationMissing,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Repository error: {0}")]
    Repository(#[from] DatabaseError),

    #[error("Notification delivery failed: {0}")]
    NotificationDelivery(#[from] NotificationError),

    #[error("Alert {alert_id} does not belong to a patient of specialist {specialist_id}")]
    NotAssigned { alert_id: Uuid, specialist_id: Uuid },

    #[error("Background task failed: {0}")]
    BackgroundTask(String),
}
