//! Database access layer
//!
//! Queries for runtime settings, alerts, clips, notification attempts,
//! snapshots and the audit log. Schema creation lives in vigil-common.

pub mod alerts;
pub mod audit;
pub mod clips;
pub mod notifications;
pub mod settings;
pub mod snapshots;

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Timestamps are stored as RFC 3339 text with fixed precision so that
/// lexical order is chronological order
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid {} timestamp '{}': {}", column, value, e)))
}

pub(crate) fn parse_guid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid guid '{}': {}", value, e)))
}
