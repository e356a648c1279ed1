/*!
SQLite state store

Durable [`StateStore`] implementation backed by `sqlx`.

## Behavior

- One row per stream in `sync_checkpoint`, one row per `(system, ext_key)`
  in `sync_binding` and `sync_item_state`; every write is an
  `INSERT .. ON CONFLICT DO UPDATE` upsert, so concurrent writers on
  different rows never interfere.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) are executed on connect;
  disabling the feature assumes external migration orchestration.

## Error mapping

Driver-level classification needs a retryability axis, so storage errors
map onto the state branch of the taxonomy: I/O and pool errors become
temporary state errors (a later run may succeed), while row-decoding
failures become permanent state errors (the persisted row is corrupt until
repaired).
*/

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::instrument;

use crate::errors::{Result, SyncError};
use crate::store::{BindingStream, StateStore};
use crate::types::{Binding, ExternalKey, KeyBinding, SyncItemState, SyncItemStatus};

fn backend(context: &str, err: sqlx::Error) -> SyncError {
    SyncError::temporary_state(format!("{context}: {err}"))
}

fn corrupt(context: &str, detail: impl std::fmt::Display) -> SyncError {
    SyncError::permanent_state(format!("{context}: {detail}"))
}

/// SQLite-backed [`StateStore`].
///
/// Example URL: `"sqlite://sync_state.db"`, or `"sqlite::memory:"` for an
/// in-process database.
pub struct SqliteStateStore {
    /// Shared connection pool for concurrent per-row upserts.
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateStore").finish()
    }
}

impl SqliteStateStore {
    /// Connect (or create) a SQLite database at `database_url`.
    #[must_use = "store must be used to persist sync state"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| backend("connect error", e))?;
        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(SyncError::permanent_state(format!(
                    "migration failure: {e}"
                )));
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Build a store over an existing pool (e.g. one shared with the host
    /// application). The schema is assumed to be in place.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    #[instrument(skip(self), err)]
    async fn get_checkpoint(&self, stream: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT token FROM sync_checkpoint WHERE stream = ?1")
            .bind(stream)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| backend("select checkpoint", e))
    }

    #[instrument(skip(self), err)]
    async fn save_checkpoint(&self, stream: &str, token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoint (stream, token, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT (stream)
            DO UPDATE SET token = excluded.token, updated_at = excluded.updated_at
            "#,
        )
        .bind(stream)
        .bind(token)
        .execute(&*self.pool)
        .await
        .map_err(|e| backend("upsert checkpoint", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn bind(
        &self,
        key: &ExternalKey,
        internal_id: &str,
        version: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_binding (system, ext_key, internal_id, version, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT (system, ext_key)
            DO UPDATE SET
                internal_id = excluded.internal_id,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key.system)
        .bind(&key.key)
        .bind(internal_id)
        .bind(version)
        .execute(&*self.pool)
        .await
        .map_err(|e| backend("upsert binding", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn get_binding(&self, key: &ExternalKey) -> Result<Option<Binding>> {
        let row = sqlx::query(
            "SELECT internal_id, version FROM sync_binding WHERE system = ?1 AND ext_key = ?2",
        )
        .bind(&key.system)
        .bind(&key.key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("select binding", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let internal_id: String = row
            .try_get("internal_id")
            .map_err(|e| corrupt("binding internal_id", e))?;
        let version: Option<String> = row
            .try_get("version")
            .map_err(|e| corrupt("binding version", e))?;
        Ok(Some(Binding::new(internal_id, version)))
    }

    async fn iter_bindings<'a>(&'a self, system: &'a str) -> Result<BindingStream<'a>> {
        let owner = system.to_string();
        let rows = sqlx::query(
            "SELECT ext_key, internal_id, version FROM sync_binding WHERE system = ?1 ORDER BY ext_key",
        )
        .bind(system)
        .fetch(&*self.pool);

        let stream = rows.map(move |row| {
            let row = row.map_err(|e| backend("iter bindings", e))?;
            let ext_key: String = row
                .try_get("ext_key")
                .map_err(|e| corrupt("binding ext_key", e))?;
            let internal_id: String = row
                .try_get("internal_id")
                .map_err(|e| corrupt("binding internal_id", e))?;
            let version: Option<String> = row
                .try_get("version")
                .map_err(|e| corrupt("binding version", e))?;
            Ok(KeyBinding {
                key: ExternalKey::new(owner.clone(), ext_key),
                binding: Binding::new(internal_id, version),
            })
        });
        Ok(stream.boxed())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn get_item_state(&self, key: &ExternalKey) -> Result<Option<SyncItemState>> {
        let row = sqlx::query(
            r#"
            SELECT version, status, attempts, last_error
            FROM sync_item_state
            WHERE system = ?1 AND ext_key = ?2
            "#,
        )
        .bind(&key.system)
        .bind(&key.key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("select item state", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let version: Option<String> = row
            .try_get("version")
            .map_err(|e| corrupt("item state version", e))?;
        let status_raw: String = row
            .try_get("status")
            .map_err(|e| corrupt("item state status", e))?;
        let status = SyncItemStatus::parse(&status_raw)
            .ok_or_else(|| corrupt("item state status", format!("unknown value '{status_raw}'")))?;
        let attempts: i64 = row
            .try_get("attempts")
            .map_err(|e| corrupt("item state attempts", e))?;
        let attempts = u32::try_from(attempts)
            .map_err(|_| corrupt("item state attempts", format!("out of range: {attempts}")))?;
        let last_error: Option<String> = row
            .try_get("last_error")
            .map_err(|e| corrupt("item state last_error", e))?;

        Ok(Some(SyncItemState::new(
            key.clone(),
            version,
            status,
            attempts,
            last_error,
        )))
    }

    #[instrument(skip(self, state), fields(key = %state.key), err)]
    async fn save_item_state(&self, state: &SyncItemState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_item_state (system, ext_key, version, status, attempts, last_error, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
            ON CONFLICT (system, ext_key)
            DO UPDATE SET
                version = excluded.version,
                status = excluded.status,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.key.system)
        .bind(&state.key.key)
        .bind(state.version.as_deref())
        .bind(state.status.as_str())
        .bind(i64::from(state.attempts))
        .bind(state.last_error.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| backend("upsert item state", e))?;
        Ok(())
    }
}
