//! SQLCipher implementation of the `TaskStore` port.
//!
//! `tasks.integration` is UNIQUE; a colliding insert surfaces as
//! `CalendarError::TaskWriteConflict` so sync can count it as skipped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kindred_core::TaskStore;
use kindred_domain::{
    CalendarError, Category, KindredError, NewCategory, Result as DomainResult, TaskPayload,
};
use rusqlite::{params, OptionalExtension};
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::DbManager;
use super::{from_millis, map_join_error, parse_rfc3339, parse_uuid, to_millis};
use crate::errors::{is_unique_violation, InfraError};

/// Categories and tasks created by calendar sync.
pub struct SqliteTaskStore {
    db: Arc<DbManager>,
}

impl SqliteTaskStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Tasks stored in `category_id`, oldest first.
    pub async fn list_tasks(&self, category_id: Uuid) -> DomainResult<Vec<TaskPayload>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> DomainResult<Vec<TaskPayload>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, category_id, priority, content, value, recurring, public,
                            active, notes, integration, checklist, reminders, start_time,
                            start_date, deadline
                     FROM tasks WHERE category_id = ?1
                     ORDER BY created_at ASC, rowid ASC",
                )
                .map_err(InfraError::from)?;

            let tasks = stmt
                .query_map(params![category_id.to_string()], |row| {
                    let user_id: String = row.get(0)?;
                    let category_id: String = row.get(1)?;
                    let checklist: String = row.get(10)?;
                    let reminders: String = row.get(11)?;
                    Ok(TaskPayload {
                        user_id: parse_uuid(0, &user_id)?,
                        category_id: parse_uuid(1, &category_id)?,
                        priority: row.get(2)?,
                        content: row.get(3)?,
                        value: row.get(4)?,
                        recurring: row.get(5)?,
                        public: row.get(6)?,
                        active: row.get(7)?,
                        notes: row.get(8)?,
                        integration: row.get(9)?,
                        checklist: parse_json(10, &checklist)?,
                        reminders: parse_json(11, &reminders)?,
                        start_time: parse_rfc3339(12, row.get(12)?)?,
                        start_date: parse_rfc3339(13, row.get(13)?)?,
                        deadline: parse_rfc3339(14, row.get(14)?)?,
                    })
                })
                .map_err(InfraError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(InfraError::from)?;

            Ok(tasks)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self))]
    async fn find_category_by_integration(
        &self,
        user_id: Uuid,
        integration: &str,
    ) -> DomainResult<Option<Category>> {
        let db = Arc::clone(&self.db);
        let integration = integration.to_string();
        task::spawn_blocking(move || -> DomainResult<Option<Category>> {
            let conn = db.get_connection()?;
            let category = conn
                .query_row(
                    "SELECT id, user_id, name, workspace_name, integration, last_edited
                     FROM categories WHERE user_id = ?1 AND integration = ?2",
                    params![user_id.to_string(), integration],
                    |row| {
                        let id: String = row.get(0)?;
                        let user_id: String = row.get(1)?;
                        Ok(Category {
                            id: parse_uuid(0, &id)?,
                            user_id: parse_uuid(1, &user_id)?,
                            name: row.get(2)?,
                            workspace_name: row.get(3)?,
                            integration: row.get(4)?,
                            last_edited: from_millis(5, row.get(5)?)?,
                        })
                    },
                )
                .optional()
                .map_err(InfraError::from)?;
            Ok(category)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, category), fields(user_id = %category.user_id, integration = %category.integration))]
    async fn create_category(&self, category: NewCategory) -> DomainResult<Category> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> DomainResult<Category> {
            let conn = db.get_connection()?;
            let created = Category {
                id: Uuid::now_v7(),
                user_id: category.user_id,
                name: category.name,
                workspace_name: category.workspace_name,
                integration: Some(category.integration),
                last_edited: Utc::now(),
            };

            conn.execute(
                "INSERT INTO categories (id, user_id, name, workspace_name, integration, last_edited)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    created.id.to_string(),
                    created.user_id.to_string(),
                    created.name,
                    created.workspace_name,
                    created.integration,
                    to_millis(created.last_edited),
                ],
            )
            .map_err(InfraError::from)?;

            debug!(category_id = %created.id, name = %created.name, "category created");
            Ok(created)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, payload), fields(integration = %payload.integration))]
    async fn insert_task(&self, payload: &TaskPayload) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let payload = payload.clone();
        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let checklist = serde_json::to_string(&payload.checklist).map_err(InfraError::from)?;
            let reminders = serde_json::to_string(&payload.reminders).map_err(InfraError::from)?;

            let inserted = conn.execute(
                "INSERT INTO tasks (
                    id, user_id, category_id, priority, content, value, recurring, public,
                    active, notes, integration, checklist, reminders, start_time, start_date,
                    deadline, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    Uuid::now_v7().to_string(),
                    payload.user_id.to_string(),
                    payload.category_id.to_string(),
                    payload.priority,
                    payload.content,
                    payload.value,
                    payload.recurring,
                    payload.public,
                    payload.active,
                    payload.notes,
                    payload.integration,
                    checklist,
                    reminders,
                    payload.start_time.map(|at| at.to_rfc3339()),
                    payload.start_date.map(|at| at.to_rfc3339()),
                    payload.deadline.map(|at| at.to_rfc3339()),
                    to_millis(Utc::now()),
                ],
            );

            match inserted {
                Ok(_) => Ok(()),
                Err(err) if is_unique_violation(&err) => {
                    Err(CalendarError::TaskWriteConflict(payload.integration).into())
                }
                Err(err) => Err(CalendarError::TaskWriteFailed(
                    KindredError::from(InfraError::from(err)).to_string(),
                )
                .into()),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn delete_task_by_integration(
        &self,
        user_id: Uuid,
        integration: &str,
    ) -> DomainResult<usize> {
        let db = Arc::clone(&self.db);
        let integration = integration.to_string();
        task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            let deleted = conn
                .execute(
                    "DELETE FROM tasks WHERE user_id = ?1 AND integration = ?2",
                    params![user_id.to_string(), integration],
                )
                .map_err(InfraError::from)?;
            Ok(deleted)
        })
        .await
        .map_err(map_join_error)?
    }
}
