use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Vitalwatch";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory (~/.vitalwatch/)
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".vitalwatch")
}

/// Default location of the monitoring database.
pub fn database_path() -> PathBuf {
    app_data_dir().join("vitalwatch.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "vitalwatch_lib=info,warn"
}

/// Tunables for alerting and pattern mining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// An alert fires when the weekly abnormal count is strictly greater than this.
    pub alert_trigger_count: u32,
    /// Length of the trailing window counted by the alert engine.
    pub alert_window_days: i64,
    /// Mining is skipped below this many abnormal readings.
    pub min_abnormal_for_mining: usize,
    /// A token must appear in at least this many abnormal readings.
    pub min_token_occurrences: u32,
    /// ...and in at least this share of them (inclusive).
    pub min_token_share: f64,
    /// Share at or above which a pattern is reported as strong.
    pub strong_token_share: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            alert_trigger_count: 3,
            alert_window_days: 7,
            min_abnormal_for_mining: 3,
            min_token_occurrences: 3,
            min_token_share: 0.4,
            strong_token_share: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("vitalwatch.db"));
    }

    #[test]
    fn app_name_is_vitalwatch() {
        assert_eq!(APP_NAME, "Vitalwatch");
    }

    #[test]
    fn defaults_match_alerting_rules() {
        let config = MonitorConfig::default();
        assert_eq!(config.alert_trigger_count, 3);
        assert_eq!(config.alert_window_days, 7);
        assert_eq!(config.min_abnormal_for_mining, 3);
        assert_eq!(config.min_token_occurrences, 3);
        assert!((config.min_token_share - 0.4).abs() < f64::EPSILON);
        assert!((config.strong_token_share - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn config_deserializes_from_json() {
        let json = serde_json::to_string(&MonitorConfig::default()).unwrap();
        let parsed: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.alert_trigger_count, 3);
    }
}
