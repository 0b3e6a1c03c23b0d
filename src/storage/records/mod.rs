pub mod conversation;
pub mod message;

use crate::error::{AppError, Result};
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        tracing::error!(error = %e, value, "Corrupt uuid column");
        AppError::Internal
    })
}

pub(crate) fn parse_uuid_list(json: &str) -> Result<Vec<Uuid>> {
    serde_json::from_str(json).map_err(|e| {
        tracing::error!(error = %e, "Corrupt uuid list column");
        AppError::Internal
    })
}

pub(crate) fn encode_uuid_list(ids: &[Uuid]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

/// Timestamps are stored as Unix milliseconds so that integer ordering
/// matches chronological ordering.
pub(crate) fn timestamp_from_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).map_err(|e| {
        tracing::error!(error = %e, millis, "Corrupt timestamp column");
        AppError::Internal
    })
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn timestamp_to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}
