//! SQLCipher implementation of the `ProcessedEventLedger` port.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred_core::ProcessedEventLedger;
use kindred_domain::{ProcessedEvent, Result as DomainResult};
use rusqlite::params;
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::DbManager;
use super::{from_millis, map_join_error, parse_uuid, to_millis};
use crate::errors::InfraError;

pub struct SqliteProcessedEventLedger {
    db: Arc<DbManager>,
}

impl SqliteProcessedEventLedger {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProcessedEventLedger for SqliteProcessedEventLedger {
    #[instrument(skip(self, entry), fields(connection_id = %entry.connection_id, integration = %entry.integration))]
    async fn record(&self, entry: &ProcessedEvent) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let entry = entry.clone();
        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO processed_events
                    (connection_id, user_id, calendar_id, integration, event_start, all_day,
                     processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (connection_id, integration) DO UPDATE SET
                    event_start = excluded.event_start,
                    all_day = excluded.all_day,
                    processed_at = excluded.processed_at",
                params![
                    entry.connection_id.to_string(),
                    entry.user_id.to_string(),
                    entry.calendar_id,
                    entry.integration,
                    to_millis(entry.event_start),
                    entry.all_day,
                    to_millis(entry.processed_at),
                ],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn list_in_range(
        &self,
        connection_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<Vec<ProcessedEvent>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> DomainResult<Vec<ProcessedEvent>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT connection_id, user_id, calendar_id, integration, event_start, all_day,
                            processed_at
                     FROM processed_events
                     WHERE connection_id = ?1 AND event_start > ?2 AND event_start < ?3
                     ORDER BY event_start ASC",
                )
                .map_err(InfraError::from)?;

            let entries = stmt
                .query_map(
                    params![connection_id.to_string(), to_millis(from), to_millis(to)],
                    |row| {
                        let connection_id: String = row.get(0)?;
                        let user_id: String = row.get(1)?;
                        Ok(ProcessedEvent {
                            connection_id: parse_uuid(0, &connection_id)?,
                            user_id: parse_uuid(1, &user_id)?,
                            calendar_id: row.get(2)?,
                            integration: row.get(3)?,
                            event_start: from_millis(4, row.get(4)?)?,
                            all_day: row.get(5)?,
                            processed_at: from_millis(6, row.get(6)?)?,
                        })
                    },
                )
                .map_err(InfraError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(InfraError::from)?;

            Ok(entries)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, integrations), fields(count = integrations.len()))]
    async fn remove(&self, connection_id: Uuid, integrations: &[String]) -> DomainResult<usize> {
        if integrations.is_empty() {
            return Ok(0);
        }

        let db = Arc::clone(&self.db);
        let integrations = integrations.to_vec();
        task::spawn_blocking(move || -> DomainResult<usize> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(InfraError::from)?;
            let mut removed = 0;
            {
                let mut stmt = tx
                    .prepare(
                        "DELETE FROM processed_events WHERE connection_id = ?1 AND integration = ?2",
                    )
                    .map_err(InfraError::from)?;
                for integration in &integrations {
                    removed += stmt
                        .execute(params![connection_id.to_string(), integration])
                        .map_err(InfraError::from)?;
                }
            }
            tx.commit().map_err(InfraError::from)?;
            Ok(removed)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn clear_connection(&self, connection_id: Uuid) -> DomainResult<usize> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            let removed = conn
                .execute(
                    "DELETE FROM processed_events WHERE connection_id = ?1",
                    params![connection_id.to_string()],
                )
                .map_err(InfraError::from)?;
            debug!(%connection_id, removed, "cleared processed events");
            Ok(removed)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    use super::*;

    const TEST_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn setup() -> (TempDir, SqliteProcessedEventLedger) {
        let dir = TempDir::new().expect("temp dir");
        let db = DbManager::new(dir.path().join("kindred.db"), 2, Some(TEST_KEY)).expect("db");
        db.run_migrations().expect("migrations");
        (dir, SqliteProcessedEventLedger::new(Arc::new(db)))
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap()
    }

    fn entry(connection_id: Uuid, event_id: &str, start_hours: i64) -> ProcessedEvent {
        ProcessedEvent {
            connection_id,
            user_id: Uuid::nil(),
            calendar_id: "primary".into(),
            integration: format!("gcal:primary:{event_id}"),
            event_start: base() + Duration::hours(start_hours),
            all_day: false,
            processed_at: base(),
        }
    }

    #[tokio::test]
    async fn lists_only_entries_inside_window() {
        let (_dir, ledger) = setup();
        let conn = Uuid::now_v7();
        for (id, hours) in [("early", -5), ("a", 9), ("b", 30), ("late", 80)] {
            ledger.record(&entry(conn, id, hours)).await.unwrap();
        }
        ledger.record(&entry(Uuid::now_v7(), "other", 9)).await.unwrap();

        let listed = ledger
            .list_in_range(conn, base(), base() + Duration::hours(48))
            .await
            .unwrap();
        let keys: Vec<_> = listed.iter().map(|e| e.integration.as_str()).collect();
        assert_eq!(keys, vec!["gcal:primary:a", "gcal:primary:b"]);
        assert_eq!(listed[0], entry(conn, "a", 9));
    }

    #[tokio::test]
    async fn window_bounds_are_exclusive_and_all_day_flag_persists() {
        let (_dir, ledger) = setup();
        let conn = Uuid::now_v7();
        for (id, hours) in [("at-from", 0), ("inside", 24), ("at-to", 48)] {
            ledger.record(&entry(conn, id, hours)).await.unwrap();
        }
        let holiday = ProcessedEvent { all_day: true, ..entry(conn, "holiday", 12) };
        ledger.record(&holiday).await.unwrap();

        let listed = ledger
            .list_in_range(conn, base(), base() + Duration::hours(48))
            .await
            .unwrap();
        let keys: Vec<_> = listed.iter().map(|e| e.integration.as_str()).collect();
        assert_eq!(keys, vec!["gcal:primary:holiday", "gcal:primary:inside"]);
        assert_eq!(listed[0], holiday);
    }

    #[tokio::test]
    async fn recording_twice_updates_start() {
        let (_dir, ledger) = setup();
        let conn = Uuid::now_v7();
        ledger.record(&entry(conn, "a", 1)).await.unwrap();
        ledger.record(&entry(conn, "a", 20)).await.unwrap();

        let listed = ledger.list_in_range(conn, base(), base() + Duration::days(2)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].event_start, base() + Duration::hours(20));
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let (_dir, ledger) = setup();
        let conn = Uuid::now_v7();
        for id in ["a", "b", "c"] {
            ledger.record(&entry(conn, id, 1)).await.unwrap();
        }

        let removed = ledger
            .remove(conn, &["gcal:primary:a".to_string(), "gcal:primary:missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(ledger.remove(conn, &[]).await.unwrap(), 0);
        assert_eq!(ledger.clear_connection(conn).await.unwrap(), 2);
        assert!(ledger
            .list_in_range(conn, base(), base() + Duration::days(1))
            .await
            .unwrap()
            .is_empty());
    }
}
