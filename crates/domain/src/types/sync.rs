//! Results and ledger records produced by calendar sync

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub tasks_created: usize,
    pub tasks_skipped: usize,
    pub tasks_deleted: usize,
    pub events_total: usize,
    /// category name -> tasks created in it
    pub categories_synced: BTreeMap<String, usize>,
    pub workspace_name: String,
}

/// Ledger row for a task created by sync.
///
/// Used only to reconcile remote deletions; task uniqueness is enforced by
/// the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub calendar_id: String,
    pub integration: String,
    /// All-day starts are stored as UTC midnight of the event's date.
    pub event_start: DateTime<Utc>,
    pub all_day: bool,
    pub processed_at: DateTime<Utc>,
}

/// Outcome of a watch renewal pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalReport {
    pub connections_checked: usize,
    pub channels_renewed: usize,
    pub channels_failed: usize,
}
