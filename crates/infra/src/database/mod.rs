//! SQLCipher-backed implementations of the core storage ports

pub mod connection_repository;
pub mod manager;
pub mod processed_event_repository;
pub mod task_store;

pub use connection_repository::SqliteConnectionRepository;
pub use manager::{DbConnection, DbManager};
pub use processed_event_repository::SqliteProcessedEventLedger;
pub use task_store::SqliteTaskStore;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use kindred_domain::KindredError;
use rusqlite::types::Type;
use uuid::Uuid;

/* -------------------------------------------------------------------------- */
/* Column codecs shared by the repositories */
/* -------------------------------------------------------------------------- */

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn parse_rfc3339(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<FixedOffset>>> {
    raw.map(|value| {
        DateTime::parse_from_rfc3339(&value).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
        })
    })
    .transpose()
}

fn map_join_error(err: tokio::task::JoinError) -> KindredError {
    KindredError::Internal(format!("blocking database task failed: {err}"))
}
