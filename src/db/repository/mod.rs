//! Repository layer — entity-scoped database operations.
//!
//! One sub-module per table group. All public functions are re-exported here.

mod alert;
mod patient;
mod reading;
mod suggestion;
mod threshold;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

pub use alert::*;
pub use patient::*;
pub use reading::*;
pub use suggestion::*;
pub use threshold::*;

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

pub(crate) fn uuid_column(row: &rusqlite::Row, idx: usize) -> Result<Uuid, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn datetime_column(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<NaiveDateTime, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn optional_datetime_column(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<Option<NaiveDateTime>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn date_column(row: &rusqlite::Row, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn enum_column<T>(row: &rusqlite::Row, idx: usize) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr<Err = super::DatabaseError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}
