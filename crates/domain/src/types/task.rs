//! Task and category payloads written by calendar sync

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::GOOGLE_INTEGRATION_PREFIX;

/// Integration key for a task created from a remote event:
/// `gcal:<calendarId>:<eventId>`.
pub fn event_integration_key(calendar_id: &str, event_id: &str) -> String {
    format!("{GOOGLE_INTEGRATION_PREFIX}:{calendar_id}:{event_id}")
}

/// Integration key for the category mirroring a remote calendar:
/// `gcal:<connectionId>:<calendarId>`.
pub fn calendar_integration_key(connection_id: Uuid, calendar_id: &str) -> String {
    format!("{GOOGLE_INTEGRATION_PREFIX}:{connection_id}:{calendar_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub content: String,
    pub completed: bool,
    pub order: i32,
}

/// A reminder attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub trigger_time: DateTime<Utc>,
    /// `absolute` for reminders computed from event times.
    #[serde(rename = "type")]
    pub kind: String,
    pub sent: bool,
    pub after_start: bool,
    pub before_start: bool,
    pub before_deadline: bool,
    pub after_deadline: bool,
}

impl Reminder {
    fn absolute(trigger_time: DateTime<Utc>) -> Self {
        Self {
            trigger_time,
            kind: "absolute".to_string(),
            sent: false,
            after_start: false,
            before_start: false,
            before_deadline: false,
            after_deadline: false,
        }
    }

    /// Reminder firing ahead of the start time.
    pub fn before_start(trigger_time: DateTime<Utc>) -> Self {
        Self { before_start: true, ..Self::absolute(trigger_time) }
    }

    /// Reminder firing when the event starts.
    pub fn at_start(trigger_time: DateTime<Utc>) -> Self {
        Self { after_start: true, ..Self::absolute(trigger_time) }
    }

    /// Reminder firing ahead of the deadline.
    pub fn before_deadline(trigger_time: DateTime<Utc>) -> Self {
        Self { before_deadline: true, ..Self::absolute(trigger_time) }
    }
}

/// Task-creation request handed to the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub priority: i32,
    pub content: String,
    pub value: f64,
    pub recurring: bool,
    pub public: bool,
    pub active: bool,
    pub notes: String,
    pub integration: String,
    pub checklist: Vec<ChecklistItem>,
    pub reminders: Vec<Reminder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<FixedOffset>>,
}

/// A task category (the local mirror of one remote calendar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub workspace_name: String,
    pub integration: Option<String>,
    pub last_edited: DateTime<Utc>,
}

/// Category creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub user_id: Uuid,
    pub name: String,
    pub workspace_name: String,
    pub integration: String,
}
