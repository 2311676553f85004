//! Reading Monitoring Engine
//!
//! Classifies health-metric readings against versioned threshold policies
//! and, for abnormal readings, runs weekly alerting and pattern mining in the
//! background.
//!
//! ## Architecture
//!
//! ```text
//! record_reading → ThresholdResolver → categorize → insert
//!                                                      │ (abnormal)
//!                                          on_reading_created
//!                                          ┌───────────┴───────────┐
//!                                     AlertEngine             PatternMiner
//!                                          │                 (Tokenizer)
//!                                 NotificationDispatcher
//!
//! specialist connects → SpecialistDeliveryTracker → NotificationDispatcher
//! ```
//!
//! ## Rules
//! - All week and time-of-day math is UTC; weeks start Monday.
//! - One alert per (patient, week), enforced by a storage uniqueness constraint.
//! - Background failures are logged and never fail the stored reading.

pub mod error;
pub mod thresholds;
pub mod categorize;
pub mod notify;
pub mod alerts;
pub mod tokenizer;
pub mod patterns;
pub mod delivery;
pub mod service;

pub use error::MonitorError;
pub use thresholds::{publish_policy, set_override, PolicyHistory, ThresholdResolver};
pub use categorize::{categorize, categorize_bands};
pub use notify::{
    render_text_body, ChannelDispatcher, DispatchRequest, LogDispatcher, NotificationDispatcher,
    NotificationError,
};
pub use alerts::{week_start, AlertEngine, AlertOutcome, SkipReason};
pub use tokenizer::{CommaTokenizer, Tokenizer};
pub use patterns::{MiningOutcome, MiningSkipReason, PatternMiner};
pub use delivery::{DeliveryReport, SpecialistDeliveryTracker};
pub use service::{FanOutReport, MonitorService, RecordedReading};
