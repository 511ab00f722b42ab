//! In-memory implementations of the core storage ports.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred_core::{ConnectionRepository, ProcessedEventLedger, TaskStore, Upserted};
use kindred_domain::{
    CalendarConnection, CalendarError, Category, KindredError, NewCategory, OAuthToken,
    ProcessedEvent, Result as DomainResult, TaskPayload, WatchChannel,
};
use uuid::Uuid;

/// In-memory mock for `ConnectionRepository`.
#[derive(Default)]
pub struct InMemoryConnections {
    rows: Mutex<Vec<CalendarConnection>>,
    fail_touch: Mutex<bool>,
}

impl InMemoryConnections {
    pub fn all(&self) -> Vec<CalendarConnection> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<CalendarConnection> {
        self.rows.lock().unwrap().iter().find(|row| row.id == id).cloned()
    }

    pub fn insert(&self, connection: CalendarConnection) {
        self.rows.lock().unwrap().push(connection);
    }

    pub fn fail_touch(&self) {
        *self.fail_touch.lock().unwrap() = true;
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut CalendarConnection)) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| KindredError::NotFound(id.to_string()))?;
        apply(row);
        Ok(())
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnections {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<CalendarConnection>> {
        Ok(self.get(id))
    }

    async fn find_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<Option<CalendarConnection>> {
        Ok(self.get(id).filter(|row| row.user_id == user_id))
    }

    async fn list_for_user(&self, user_id: Uuid) -> DomainResult<Vec<CalendarConnection>> {
        Ok(self.all().into_iter().filter(|row| row.user_id == user_id).collect())
    }

    async fn list_with_watch_channels(&self) -> DomainResult<Vec<CalendarConnection>> {
        Ok(self.all().into_iter().filter(|row| !row.watch_channels.is_empty()).collect())
    }

    async fn upsert(&self, candidate: &CalendarConnection) -> DomainResult<Upserted> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|row| {
            row.user_id == candidate.user_id
                && row.provider == candidate.provider
                && row.provider_account_id == candidate.provider_account_id
        }) {
            row.access_token = candidate.access_token.clone();
            if !candidate.refresh_token.is_empty() {
                row.refresh_token = candidate.refresh_token.clone();
            }
            row.token_expiry = candidate.token_expiry;
            row.scopes = candidate.scopes.clone();
            row.updated_at = candidate.updated_at;
            return Ok(Upserted::Updated(row.clone()));
        }
        rows.push(candidate.clone());
        Ok(Upserted::Created(candidate.clone()))
    }

    async fn update_token(
        &self,
        id: Uuid,
        token: &OAuthToken,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.update(id, |row| {
            row.access_token = token.access_token.clone();
            if !token.refresh_token.is_empty() {
                row.refresh_token = token.refresh_token.clone();
            }
            row.token_expiry = token.expiry;
            row.updated_at = updated_at;
        })
    }

    async fn replace_watch_channels(
        &self,
        id: Uuid,
        channels: &[WatchChannel],
        updated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.update(id, |row| {
            row.watch_channels = channels.to_vec();
            row.updated_at = updated_at;
        })
    }

    async fn replace_watch_channel(
        &self,
        id: Uuid,
        old_channel_id: &str,
        channel: &WatchChannel,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.update(id, |row| {
            row.watch_channels.retain(|existing| existing.channel_id != old_channel_id);
            row.watch_channels.push(channel.clone());
            row.updated_at = updated_at;
        })
    }

    async fn touch_last_sync(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        if *self.fail_touch.lock().unwrap() {
            return Err(KindredError::Database("disk full".into()));
        }
        self.update(id, |row| row.last_sync = Some(at))
    }

    async fn delete_for_user(&self, id: Uuid, user_id: Uuid) -> DomainResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| !(row.id == id && row.user_id == user_id));
        Ok(rows.len() != before)
    }
}

/// In-memory mock for `TaskStore`.
#[derive(Default)]
pub struct InMemoryTaskStore {
    categories: Mutex<Vec<Category>>,
    tasks: Mutex<Vec<TaskPayload>>,
    fail_writes: Mutex<bool>,
}

impl InMemoryTaskStore {
    pub fn categories(&self) -> Vec<Category> {
        self.categories.lock().unwrap().clone()
    }

    pub fn tasks(&self) -> Vec<TaskPayload> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_category_by_integration(
        &self,
        user_id: Uuid,
        integration: &str,
    ) -> DomainResult<Option<Category>> {
        Ok(self
            .categories()
            .into_iter()
            .find(|c| c.user_id == user_id && c.integration.as_deref() == Some(integration)))
    }

    async fn create_category(&self, category: NewCategory) -> DomainResult<Category> {
        let created = Category {
            id: Uuid::now_v7(),
            user_id: category.user_id,
            name: category.name,
            workspace_name: category.workspace_name,
            integration: Some(category.integration),
            last_edited: Utc::now(),
        };
        self.categories.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn insert_task(&self, task: &TaskPayload) -> DomainResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(KindredError::Database("connection reset".into()));
        }
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.iter().any(|existing| existing.integration == task.integration) {
            return Err(CalendarError::TaskWriteConflict(task.integration.clone()).into());
        }
        tasks.push(task.clone());
        Ok(())
    }

    async fn delete_task_by_integration(
        &self,
        user_id: Uuid,
        integration: &str,
    ) -> DomainResult<usize> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|task| !(task.user_id == user_id && task.integration == integration));
        Ok(before - tasks.len())
    }
}

/// In-memory mock for `ProcessedEventLedger`.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<Vec<ProcessedEvent>>,
}

impl InMemoryLedger {
    pub fn entries(&self) -> Vec<ProcessedEvent> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessedEventLedger for InMemoryLedger {
    async fn record(&self, entry: &ProcessedEvent) -> DomainResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|existing| {
            !(existing.connection_id == entry.connection_id
                && existing.integration == entry.integration)
        });
        entries.push(entry.clone());
        Ok(())
    }

    async fn list_in_range(
        &self,
        connection_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<Vec<ProcessedEvent>> {
        Ok(self
            .entries()
            .into_iter()
            .filter(|e| e.connection_id == connection_id && e.event_start > from && e.event_start < to)
            .collect())
    }

    async fn remove(&self, connection_id: Uuid, integrations: &[String]) -> DomainResult<usize> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !(e.connection_id == connection_id && integrations.contains(&e.integration)));
        Ok(before - entries.len())
    }

    async fn clear_connection(&self, connection_id: Uuid) -> DomainResult<usize> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.connection_id != connection_id);
        Ok(before - entries.len())
    }
}
