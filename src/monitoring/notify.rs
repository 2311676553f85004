//! Notification boundary.
//!
//! The engines build `DispatchRequest`s; a `NotificationDispatcher` delivers
//! them. Delivery is best-effort: a failure is logged by the caller and never
//! rolls back the alert that caused it.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Category, NotificationKind, Reading};

/// Maximum queued requests per recipient while they are unreachable.
const MAX_PENDING_PER_RECIPIENT: usize = 50;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Queue full for recipient {0}")]
    QueueFull(Uuid),

    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// One row of the abnormal-readings table attached to an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbnormalReadingLine {
    pub taken_at: NaiveDateTime,
    pub value: f64,
    pub unit: String,
    pub category: Category,
    pub food_note: Option<String>,
}

impl From<&Reading> for AbnormalReadingLine {
    fn from(reading: &Reading) -> Self {
        Self {
            taken_at: reading.taken_at,
            value: reading.value,
            unit: reading.unit.clone(),
            category: reading.category,
            food_note: reading.food_tags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub alert_id: Uuid,
    pub recipient_user_id: Uuid,
    pub recipient_email: Option<String>,
    pub kind: NotificationKind,
    pub summary: String,
    pub abnormal_readings: Vec<AbnormalReadingLine>,
    pub abnormal_count: u32,
}

/// Performs actual delivery (email, push). Implementations own their timeouts.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), NotificationError>;
}

/// Plain-text email body: the summary followed by the readings table.
pub fn render_text_body(request: &DispatchRequest) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "{}", request.summary);
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Abnormal readings in the past 7 days: {}",
        request.abnormal_count
    );
    let _ = writeln!(
        body,
        "{:<19} | {:>8} | {:<6} | {:<10} | Food",
        "Taken at", "Value", "Unit", "Category"
    );
    for line in &request.abnormal_readings {
        let _ = writeln!(
            body,
            "{:<19} | {:>8.1} | {:<6} | {:<10} | {}",
            line.taken_at.format("%Y-%m-%d %H:%M:%S"),
            line.value,
            line.unit,
            line.category.as_str(),
            line.food_note.as_deref().unwrap_or("-"),
        );
    }
    body
}

/// Dispatcher that only logs. Used when no transport is configured.
#[derive(Debug, Default)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), NotificationError> {
        tracing::info!(
            alert_id = %request.alert_id,
            recipient = %request.recipient_user_id,
            kind = request.kind.as_str(),
            abnormal_count = request.abnormal_count,
            "Notification dispatched (log only)"
        );
        Ok(())
    }
}

#[derive(Default)]
struct ChannelState {
    channels: HashMap<Uuid, mpsc::Sender<DispatchRequest>>,
    pending: HashMap<Uuid, VecDeque<DispatchRequest>>,
}

/// In-process push: one bounded channel per connected recipient.
///
/// Patient requests for a recipient without a live channel are queued (up
/// to `MAX_PENDING_PER_RECIPIENT`) and flushed when the recipient registers.
/// Specialist requests are never queued here: they fail with `Unavailable`
/// and stay pending for `SpecialistDeliveryTracker`.
#[derive(Default)]
pub struct ChannelDispatcher {
    state: Mutex<ChannelState>,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a recipient's channel and flush anything queued for them.
    pub fn register(
        &self,
        user_id: Uuid,
        tx: mpsc::Sender<DispatchRequest>,
    ) -> Result<(), NotificationError> {
        let mut state = self.lock()?;
        state.channels.insert(user_id, tx.clone());
        if let Some(queue) = state.pending.get_mut(&user_id) {
            while let Some(request) = queue.pop_front() {
                match tx.try_send(request) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(r))
                    | Err(mpsc::error::TrySendError::Closed(r)) => {
                        queue.push_front(r);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn unregister(&self, user_id: &Uuid) -> Result<(), NotificationError> {
        self.lock()?.channels.remove(user_id);
        Ok(())
    }

    pub fn pending_count(&self, user_id: &Uuid) -> usize {
        self.lock()
            .map(|state| state.pending.get(user_id).map(VecDeque::len).unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChannelState>, NotificationError> {
        self.state
            .lock()
            .map_err(|_| NotificationError::Unavailable("dispatcher lock poisoned".into()))
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), NotificationError> {
        let mut state = self.lock()?;
        let user_id = request.recipient_user_id;

        let attempt = state
            .channels
            .get(&user_id)
            .map(|tx| tx.try_send(request.clone()));
        let unsent = match attempt {
            Some(Ok(())) => return Ok(()),
            Some(Err(mpsc::error::TrySendError::Full(r))) => r,
            Some(Err(mpsc::error::TrySendError::Closed(r))) => {
                state.channels.remove(&user_id);
                r
            }
            None => request.clone(),
        };

        // Undelivered specialist alerts stay pending in storage and are sent
        // by the delivery tracker when the specialist connects.
        if unsent.kind == NotificationKind::SpecialistAlert {
            return Err(NotificationError::Unavailable(format!(
                "specialist {user_id} is not connected"
            )));
        }

        let queue = state.pending.entry(user_id).or_default();
        if queue.len() >= MAX_PENDING_PER_RECIPIENT {
            return Err(NotificationError::QueueFull(user_id));
        }
        queue.push_back(unsent);
        tracing::debug!(recipient = %user_id, queued = queue.len(), "Recipient unreachable, request queued");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every request; optionally fails for chosen recipients.
    #[derive(Default)]
    pub struct RecordingDispatcher {
        pub sent: Mutex<Vec<DispatchRequest>>,
        pub failing: Mutex<Vec<Uuid>>,
    }

    impl RecordingDispatcher {
        pub fn fail_for(&self, user_id: Uuid) {
            self.failing.lock().unwrap().push(user_id);
        }

        pub fn sent(&self) -> Vec<DispatchRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl NotificationDispatcher for RecordingDispatcher {
        fn dispatch(&self, request: &DispatchRequest) -> Result<(), NotificationError> {
            if self.failing.lock().unwrap().contains(&request.recipient_user_id) {
                return Err(NotificationError::Transport("smtp refused".into()));
            }
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::at;

    fn make_request(recipient: Uuid) -> DispatchRequest {
        DispatchRequest {
            alert_id: Uuid::new_v4(),
            recipient_user_id: recipient,
            recipient_email: None,
            kind: NotificationKind::PatientAlert,
            summary: "4 abnormal readings this week".into(),
            abnormal_readings: vec![AbnormalReadingLine {
                taken_at: at("2026-03-02 08:30:00"),
                value: 182.5,
                unit: "mg/dL".into(),
                category: Category::Abnormal,
                food_note: Some("pizza".into()),
            }],
            abnormal_count: 4,
        }
    }

    #[test]
    fn text_body_contains_table_rows() {
        let body = render_text_body(&make_request(Uuid::new_v4()));
        assert!(body.starts_with("4 abnormal readings this week"));
        assert!(body.contains("2026-03-02 08:30:00"));
        assert!(body.contains("182.5"));
        assert!(body.contains("pizza"));
        assert!(body.contains("abnormal"));
    }

    #[test]
    fn connected_recipient_receives_immediately() {
        let dispatcher = ChannelDispatcher::new();
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        dispatcher.register(user, tx).unwrap();

        let request = make_request(user);
        dispatcher.dispatch(&request).unwrap();
        assert_eq!(rx.try_recv().unwrap(), request);
        assert_eq!(dispatcher.pending_count(&user), 0);
    }

    #[test]
    fn disconnected_recipient_is_queued_then_flushed() {
        let dispatcher = ChannelDispatcher::new();
        let user = Uuid::new_v4();
        dispatcher.dispatch(&make_request(user)).unwrap();
        dispatcher.dispatch(&make_request(user)).unwrap();
        assert_eq!(dispatcher.pending_count(&user), 2);

        let (tx, mut rx) = mpsc::channel(4);
        dispatcher.register(user, tx).unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert_eq!(dispatcher.pending_count(&user), 0);
    }

    #[test]
    fn closed_channel_falls_back_to_queue() {
        let dispatcher = ChannelDispatcher::new();
        let user = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(4);
        dispatcher.register(user, tx).unwrap();
        drop(rx);

        dispatcher.dispatch(&make_request(user)).unwrap();
        assert_eq!(dispatcher.pending_count(&user), 1);
    }

    #[test]
    fn offline_specialist_alert_is_not_queued() {
        let dispatcher = ChannelDispatcher::new();
        let specialist = Uuid::new_v4();
        let request = DispatchRequest {
            kind: NotificationKind::SpecialistAlert,
            ..make_request(specialist)
        };

        assert!(matches!(
            dispatcher.dispatch(&request),
            Err(NotificationError::Unavailable(_))
        ));
        assert_eq!(dispatcher.pending_count(&specialist), 0);

        let (tx, mut rx) = mpsc::channel(4);
        dispatcher.register(specialist, tx).unwrap();
        assert!(rx.try_recv().is_err());
        dispatcher.dispatch(&request).unwrap();
        assert_eq!(rx.try_recv().unwrap(), request);
    }

    #[test]
    fn queue_overflow_is_an_error() {
        let dispatcher = ChannelDispatcher::new();
        let user = Uuid::new_v4();
        for _ in 0..MAX_PENDING_PER_RECIPIENT {
            dispatcher.dispatch(&make_request(user)).unwrap();
        }
        assert!(matches!(
            dispatcher.dispatch(&make_request(user)),
            Err(NotificationError::QueueFull(id)) if id == user
        ));
        assert_eq!(dispatcher.pending_count(&user), MAX_PENDING_PER_RECIPIENT);
    }
}
