use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::AlertingConfig;
use crate::db::enums::NotificationStateKind;
use crate::db::error::StoreError;
use crate::db::models::{Alert, AlertRow, NotificationState, NotificationStateRow};

const ALERT_COLUMNS: &str = r#"id, dashboard_id, panel_id, name, message, state, new_state_date, state_changes, frequency, "for", handler, silenced, execution_error, eval_data, eval_date, settings, created, updated"#;

const NOTIFICATION_STATE_COLUMNS: &str =
    "id, dashboard_id, alert_id, notifier_id, state, version, updated_at";

/// Durable access to alert rows and their per-dashboard notification state.
///
/// This is the only component that touches storage. Nothing here retries: a
/// failed call is surfaced as-is so the caller can apply its own policy.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Atomically replaces every alert (and all notification state) of a dashboard.
    /// Returns the inserted alerts with their storage-assigned ids.
    async fn replace_dashboard_alerts(
        &self,
        dashboard_id: i64,
        alerts: Vec<Alert>,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Removes a dashboard's alerts and notification state, returning the number
    /// of alerts deleted.
    async fn delete_dashboard_alerts(&self, dashboard_id: i64) -> Result<u64, StoreError>;

    /// Every stored alert. Malformed documents on individual rows are tolerated.
    async fn get_all(&self) -> Result<Vec<Alert>, StoreError>;

    /// Alerts of one dashboard, decoded as leniently as `get_all`.
    async fn get_dashboard_alerts(&self, dashboard_id: i64) -> Result<Vec<Alert>, StoreError>;

    /// One alert, decoded strictly.
    async fn get_by_id(&self, id: i64) -> Result<Alert, StoreError>;

    /// Persists only the runtime subset of `alert`, provided the stored row
    /// still has `state_changes == expected_state_changes`.
    async fn update_runtime_fields(
        &self,
        alert: &Alert,
        expected_state_changes: i64,
    ) -> Result<(), StoreError>;

    async fn upsert_notification_state(
        &self,
        dashboard_id: i64,
        alert_id: i64,
        notifier_id: i64,
        state: NotificationStateKind,
    ) -> Result<NotificationState, StoreError>;

    async fn get_notification_states(
        &self,
        dashboard_id: i64,
    ) -> Result<Vec<NotificationState>, StoreError>;
}

#[derive(Clone, Debug)]
pub struct SqliteAlertStore {
    pool: SqlitePool,
}

impl SqliteAlertStore {
    /// Connects to the configured database, creating the file if needed.
    #[tracing::instrument(skip(config), fields(database_url = %config.database_url), level = "info")]
    pub async fn connect(config: &AlertingConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_in_memory() {
            // Recycling a connection would drop the database with it.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        info!("Connected to alert database.");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Alert database migrations completed successfully.");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn delete_dashboard_rows(
        tx: &mut Transaction<'_, Sqlite>,
        dashboard_id: i64,
    ) -> Result<u64, StoreError> {
        let deleted = sqlx::query("DELETE FROM alert WHERE dashboard_id = ?")
            .bind(dashboard_id)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM alert_notification_state WHERE dashboard_id = ?")
            .bind(dashboard_id)
            .execute(&mut **tx)
            .await?;

        Ok(deleted)
    }

    async fn insert_alert(
        tx: &mut Transaction<'_, Sqlite>,
        dashboard_id: i64,
        alert: &Alert,
    ) -> Result<i64, StoreError> {
        let settings = encode_document("settings", &alert.settings)?;
        let eval_data = alert
            .eval_data
            .as_ref()
            .map(|data| encode_document("eval_data", data))
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO alert (dashboard_id, panel_id, name, message, state, new_state_date, state_changes, frequency, "for", handler, silenced, execution_error, eval_data, eval_date, settings, created, updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(dashboard_id)
        .bind(alert.panel_id)
        .bind(&alert.name)
        .bind(&alert.message)
        .bind(alert.state.as_str())
        .bind(alert.new_state_date)
        .bind(alert.state_changes)
        .bind(alert.frequency)
        .bind(alert.for_duration)
        .bind(alert.handler)
        .bind(alert.silenced)
        .bind(&alert.execution_error)
        .bind(eval_data)
        .bind(alert.eval_date)
        .bind(settings)
        .bind(alert.created)
        .bind(alert.updated)
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn alert_exists(&self, id: i64) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM alert WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    fn decode_rows(rows: Vec<AlertRow>) -> Vec<Alert> {
        rows.into_iter()
            .map(|row| {
                let (alert, failures) = row.decode_lenient();
                for failure in failures {
                    warn!(alert_id = alert.id, error = %failure, "Tolerating malformed alert row.");
                }
                alert
            })
            .collect()
    }
}

fn encode_document(field: &'static str, value: &Value) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Encode { field, source })
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    #[tracing::instrument(skip(self, alerts), fields(count = alerts.len()), level = "debug")]
    async fn replace_dashboard_alerts(
        &self,
        dashboard_id: i64,
        alerts: Vec<Alert>,
    ) -> Result<Vec<Alert>, StoreError> {
        // Dropping `tx` on any early return rolls the whole replace back.
        let mut tx = self.pool.begin().await?;

        let removed = Self::delete_dashboard_rows(&mut tx, dashboard_id).await?;

        let mut stored = Vec::with_capacity(alerts.len());
        for mut alert in alerts {
            alert.dashboard_id = dashboard_id;
            alert.id = Self::insert_alert(&mut tx, dashboard_id, &alert).await?;
            stored.push(alert);
        }

        tx.commit().await?;
        debug!(removed, inserted = stored.len(), "Replaced dashboard alerts.");
        Ok(stored)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn delete_dashboard_alerts(&self, dashboard_id: i64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = Self::delete_dashboard_rows(&mut tx, dashboard_id).await?;
        tx.commit().await?;
        debug!(removed, "Deleted dashboard alerts.");
        Ok(removed)
    }

    async fn get_all(&self) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(Self::decode_rows(rows))
    }

    async fn get_dashboard_alerts(&self, dashboard_id: i64) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert WHERE dashboard_id = ? ORDER BY panel_id, id"
        ))
        .bind(dashboard_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Self::decode_rows(rows))
    }

    async fn get_by_id(&self, id: i64) -> Result<Alert, StoreError> {
        sqlx::query_as::<_, AlertRow>(&format!("SELECT {ALERT_COLUMNS} FROM alert WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?
            .decode()
    }

    #[tracing::instrument(skip(self, alert), fields(alert_id = alert.id, state = %alert.state), level = "debug")]
    async fn update_runtime_fields(
        &self,
        alert: &Alert,
        expected_state_changes: i64,
    ) -> Result<(), StoreError> {
        let eval_data = alert
            .eval_data
            .as_ref()
            .map(|data| encode_document("eval_data", data))
            .transpose()?;

        // execution_error is bound as-is: NULL clears a previous error, and an
        // empty string is stored as an empty string.
        let updated = sqlx::query(
            r#"
            UPDATE alert
            SET state = ?, new_state_date = ?, state_changes = ?, eval_data = ?, execution_error = ?, updated = ?
            WHERE id = ? AND state_changes = ?
            "#,
        )
        .bind(alert.state.as_str())
        .bind(alert.new_state_date)
        .bind(alert.state_changes)
        .bind(eval_data)
        .bind(&alert.execution_error)
        .bind(alert.updated)
        .bind(alert.id)
        .bind(expected_state_changes)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            // Either a resync deleted the row, or another transition got there first.
            return if self.alert_exists(alert.id).await? {
                Err(StoreError::Conflict(alert.id))
            } else {
                Err(StoreError::NotFound(alert.id))
            };
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn upsert_notification_state(
        &self,
        dashboard_id: i64,
        alert_id: i64,
        notifier_id: i64,
        state: NotificationStateKind,
    ) -> Result<NotificationState, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO alert_notification_state (dashboard_id, alert_id, notifier_id, state, version, updated_at)
            VALUES (?, ?, ?, ?, 0, ?)
            ON CONFLICT (alert_id, notifier_id) DO UPDATE
            SET state = excluded.state,
                dashboard_id = excluded.dashboard_id,
                version = alert_notification_state.version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(dashboard_id)
        .bind(alert_id)
        .bind(notifier_id)
        .bind(state.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, NotificationStateRow>(&format!(
            "SELECT {NOTIFICATION_STATE_COLUMNS} FROM alert_notification_state WHERE alert_id = ? AND notifier_id = ?"
        ))
        .bind(alert_id)
        .bind(notifier_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        NotificationState::try_from(row)
    }

    async fn get_notification_states(
        &self,
        dashboard_id: i64,
    ) -> Result<Vec<NotificationState>, StoreError> {
        sqlx::query_as::<_, NotificationStateRow>(&format!(
            "SELECT {NOTIFICATION_STATE_COLUMNS} FROM alert_notification_state WHERE dashboard_id = ? ORDER BY id"
        ))
        .bind(dashboard_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(NotificationState::try_from)
        .collect()
    }
}
