//! SQLCipher implementation of the `ConnectionRepository` port.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred_core::{ConnectionRepository, Upserted};
use kindred_domain::{
    CalendarConnection, KindredError, OAuthToken, ProviderTag, Result as DomainResult,
    WatchChannel,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::DbManager;
use super::{from_millis, map_join_error, parse_uuid, to_millis};
use crate::errors::InfraError;

const CONNECTION_COLUMNS: &str = "id, user_id, provider, provider_account_id, access_token,
    refresh_token, token_expiry, scopes, is_primary, last_sync, created_at, updated_at";

/// Calendar connections and their watch channels.
pub struct SqliteConnectionRepository {
    db: Arc<DbManager>,
}

impl SqliteConnectionRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn with_connection<T, F>(&self, op: F) -> DomainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DomainResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> DomainResult<T> {
            let mut conn = db.get_connection()?;
            op(&mut conn)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl ConnectionRepository for SqliteConnectionRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<CalendarConnection>> {
        self.with_connection(move |conn| {
            load_connection(conn, "WHERE id = ?1", params![id.to_string()])
        })
        .await
    }

    #[instrument(skip(self))]
    async fn find_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<Option<CalendarConnection>> {
        self.with_connection(move |conn| {
            load_connection(
                conn,
                "WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id.to_string()],
            )
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: Uuid) -> DomainResult<Vec<CalendarConnection>> {
        self.with_connection(move |conn| {
            load_connections(
                conn,
                "WHERE user_id = ?1 ORDER BY created_at ASC",
                params![user_id.to_string()],
            )
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_with_watch_channels(&self) -> DomainResult<Vec<CalendarConnection>> {
        self.with_connection(|conn| {
            load_connections(
                conn,
                "WHERE id IN (SELECT DISTINCT connection_id FROM watch_channels)
                 ORDER BY created_at ASC",
                params![],
            )
        })
        .await
    }

    #[instrument(skip(self, candidate), fields(user_id = %candidate.user_id, provider = %candidate.provider))]
    async fn upsert(&self, candidate: &CalendarConnection) -> DomainResult<Upserted> {
        let candidate = candidate.clone();
        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(InfraError::from)?;
            let scopes = serde_json::to_string(&candidate.scopes).map_err(InfraError::from)?;

            // Refresh token is only replaced when the provider issued a new one.
            let stored_id: String = tx
                .query_row(
                    "INSERT INTO calendar_connections (
                        id, user_id, provider, provider_account_id, access_token,
                        refresh_token, token_expiry, scopes, is_primary, last_sync,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    ON CONFLICT (user_id, provider, provider_account_id) DO UPDATE SET
                        access_token = excluded.access_token,
                        refresh_token = CASE
                            WHEN excluded.refresh_token = '' THEN calendar_connections.refresh_token
                            ELSE excluded.refresh_token
                        END,
                        token_expiry = excluded.token_expiry,
                        scopes = excluded.scopes,
                        updated_at = excluded.updated_at
                    RETURNING id",
                    params![
                        candidate.id.to_string(),
                        candidate.user_id.to_string(),
                        candidate.provider.as_str(),
                        candidate.provider_account_id,
                        candidate.access_token,
                        candidate.refresh_token,
                        to_millis(candidate.token_expiry),
                        scopes,
                        candidate.is_primary,
                        candidate.last_sync.map(to_millis),
                        to_millis(candidate.created_at),
                        to_millis(candidate.updated_at),
                    ],
                    |row| row.get(0),
                )
                .map_err(InfraError::from)?;

            let stored = load_connection(&tx, "WHERE id = ?1", params![stored_id])?.ok_or_else(
                || KindredError::Internal("upserted connection vanished".into()),
            )?;
            tx.commit().map_err(InfraError::from)?;

            if stored.id == candidate.id {
                debug!(connection_id = %stored.id, "calendar connection created");
                Ok(Upserted::Created(stored))
            } else {
                debug!(connection_id = %stored.id, "calendar connection updated");
                Ok(Upserted::Updated(stored))
            }
        })
        .await
    }

    #[instrument(skip(self, token))]
    async fn update_token(
        &self,
        id: Uuid,
        token: &OAuthToken,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let token = token.clone();
        self.with_connection(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_connections
                     SET access_token = ?2,
                         refresh_token = CASE WHEN ?3 = '' THEN refresh_token ELSE ?3 END,
                         token_expiry = ?4,
                         updated_at = ?5
                     WHERE id = ?1",
                    params![
                        id.to_string(),
                        token.access_token,
                        token.refresh_token,
                        to_millis(token.expiry),
                        to_millis(updated_at)
                    ],
                )
                .map_err(InfraError::from)?;
            ensure_changed(changed, id)
        })
        .await
    }

    #[instrument(skip(self, channels), fields(channels = channels.len()))]
    async fn replace_watch_channels(
        &self,
        id: Uuid,
        channels: &[WatchChannel],
        updated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let channels = channels.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(InfraError::from)?;
            let changed = touch_updated_at(&tx, id, updated_at)?;
            ensure_changed(changed, id)?;

            tx.execute("DELETE FROM watch_channels WHERE connection_id = ?1", params![id.to_string()])
                .map_err(InfraError::from)?;
            for channel in &channels {
                insert_watch_channel(&tx, id, channel)?;
            }

            tx.commit().map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, channel), fields(new_channel_id = %channel.channel_id))]
    async fn replace_watch_channel(
        &self,
        id: Uuid,
        old_channel_id: &str,
        channel: &WatchChannel,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let old_channel_id = old_channel_id.to_string();
        let channel = channel.clone();
        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(InfraError::from)?;
            let changed = touch_updated_at(&tx, id, updated_at)?;
            ensure_changed(changed, id)?;

            tx.execute(
                "DELETE FROM watch_channels WHERE connection_id = ?1 AND channel_id = ?2",
                params![id.to_string(), old_channel_id],
            )
            .map_err(InfraError::from)?;
            insert_watch_channel(&tx, id, &channel)?;

            tx.commit().map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn touch_last_sync(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        self.with_connection(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_connections SET last_sync = ?2, updated_at = ?2 WHERE id = ?1",
                    params![id.to_string(), to_millis(at)],
                )
                .map_err(InfraError::from)?;
            ensure_changed(changed, id)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_for_user(&self, id: Uuid, user_id: Uuid) -> DomainResult<bool> {
        self.with_connection(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM calendar_connections WHERE id = ?1 AND user_id = ?2",
                    params![id.to_string(), user_id.to_string()],
                )
                .map_err(InfraError::from)?;
            Ok(deleted > 0)
        })
        .await
    }
}

fn ensure_changed(changed: usize, id: Uuid) -> DomainResult<()> {
    if changed == 0 {
        return Err(KindredError::NotFound(format!("calendar connection {id}")));
    }
    Ok(())
}

fn touch_updated_at(conn: &Connection, id: Uuid, updated_at: DateTime<Utc>) -> DomainResult<usize> {
    conn.execute(
        "UPDATE calendar_connections SET updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), to_millis(updated_at)],
    )
    .map_err(|err| InfraError::from(err).into())
}

fn insert_watch_channel(conn: &Connection, id: Uuid, channel: &WatchChannel) -> DomainResult<()> {
    conn.execute(
        "INSERT INTO watch_channels
            (connection_id, calendar_id, channel_id, resource_id, expiration, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            channel.calendar_id,
            channel.channel_id,
            channel.resource_id,
            to_millis(channel.expiration),
            to_millis(channel.created_at),
        ],
    )
    .map_err(InfraError::from)?;
    Ok(())
}

fn load_connection(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> DomainResult<Option<CalendarConnection>> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM calendar_connections {filter}");
    let connection = conn
        .query_row(&sql, params, map_connection_row)
        .optional()
        .map_err(InfraError::from)?;

    match connection {
        Some(mut connection) => {
            connection.watch_channels = load_watch_channels(conn, connection.id)?;
            Ok(Some(connection))
        }
        None => Ok(None),
    }
}

fn load_connections(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> DomainResult<Vec<CalendarConnection>> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM calendar_connections {filter}");
    let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
    let rows = stmt
        .query_map(params, map_connection_row)
        .map_err(InfraError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(InfraError::from)?;

    rows.into_iter()
        .map(|mut connection| {
            connection.watch_channels = load_watch_channels(conn, connection.id)?;
            Ok(connection)
        })
        .collect()
}

fn load_watch_channels(conn: &Connection, id: Uuid) -> DomainResult<Vec<WatchChannel>> {
    let mut stmt = conn
        .prepare(
            "SELECT calendar_id, channel_id, resource_id, expiration, created_at
             FROM watch_channels
             WHERE connection_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )
        .map_err(InfraError::from)?;

    let channels = stmt
        .query_map(params![id.to_string()], |row| {
            Ok(WatchChannel {
                calendar_id: row.get(0)?,
                channel_id: row.get(1)?,
                resource_id: row.get(2)?,
                expiration: from_millis(3, row.get(3)?)?,
                created_at: from_millis(4, row.get(4)?)?,
            })
        })
        .map_err(InfraError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(InfraError::from)?;

    Ok(channels)
}

fn map_connection_row(row: &Row<'_>) -> rusqlite::Result<CalendarConnection> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let provider: String = row.get(2)?;
    let scopes: String = row.get(7)?;
    let last_sync: Option<i64> = row.get(9)?;

    Ok(CalendarConnection {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        provider: ProviderTag::from_str(&provider).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, err.to_string().into())
        })?,
        provider_account_id: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expiry: from_millis(6, row.get(6)?)?,
        scopes: serde_json::from_str(&scopes)
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(err)))?,
        is_primary: row.get(8)?,
        last_sync: last_sync.map(|millis| from_millis(9, millis)).transpose()?,
        watch_channels: Vec::new(),
        created_at: from_millis(10, row.get(10)?)?,
        updated_at: from_millis(11, row.get(11)?)?,
    })
}
