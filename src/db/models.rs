use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::db::enums::{AlertState, NotificationStateKind};
use crate::db::error::StoreError;

/// A monitoring rule bound to one dashboard panel.
/// Corresponds to the `alert` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64, // Storage-assigned, 0 until inserted
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub name: String,
    pub message: String,
    pub state: AlertState,
    pub new_state_date: DateTime<Utc>,
    pub state_changes: i64,
    pub frequency: i64, // Seconds between evaluations
    #[serde(rename = "for")]
    pub for_duration: i64, // Seconds a condition must hold before alerting
    pub handler: i64,
    pub silenced: bool,
    pub execution_error: Option<String>,
    pub eval_data: Option<Value>,
    pub eval_date: Option<DateTime<Utc>>,
    pub settings: Value,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Alert {
    /// Builds a candidate alert with fresh runtime fields.
    pub fn new(dashboard_id: i64, panel_id: i64, name: impl Into<String>, settings: Value) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            dashboard_id,
            panel_id,
            name: name.into(),
            message: String::new(),
            state: AlertState::Unknown,
            new_state_date: now,
            state_changes: 0,
            frequency: 60,
            for_duration: 0,
            handler: 1,
            silenced: false,
            execution_error: None,
            eval_data: None,
            eval_date: None,
            settings,
            created: now,
            updated: now,
        }
    }

    /// Discards all evaluation history, as if the alert had just been defined at `now`.
    pub fn reset_runtime(&mut self, now: DateTime<Utc>) {
        self.state = AlertState::Unknown;
        self.state_changes = 0;
        self.new_state_date = now;
        self.created = now;
        self.updated = now;
        self.execution_error = None;
        self.eval_data = None;
        self.eval_date = None;
    }
}

/// Raw `alert` row. Document, enum and timestamp columns stay as text so that a
/// malformed value can be tolerated per field instead of failing the whole query.
#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub name: String,
    pub message: String,
    pub state: String,
    pub new_state_date: String,
    pub state_changes: i64,
    pub frequency: i64,
    #[sqlx(rename = "for")]
    pub for_duration: i64,
    pub handler: i64,
    pub silenced: bool,
    pub execution_error: Option<String>,
    pub eval_data: Option<String>,
    pub eval_date: Option<String>,
    pub settings: Option<String>,
    pub created: String,
    pub updated: String,
}

/// Accepts RFC 3339 (what this crate writes) and SQLite's `CURRENT_TIMESTAMP` form.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|ts| ts.and_utc()))
}

impl AlertRow {
    /// Decodes every field, failing on the first malformed one.
    pub fn decode(self) -> Result<Alert, StoreError> {
        let (alert, mut failures) = self.decode_lenient();
        if failures.is_empty() {
            Ok(alert)
        } else {
            Err(failures.swap_remove(0))
        }
    }

    /// Decodes what it can. Malformed fields are left at their zero value and
    /// reported alongside the alert.
    pub fn decode_lenient(self) -> (Alert, Vec<StoreError>) {
        let alert_id = self.id;
        let mut failures = Vec::new();

        let state = self.state.parse::<AlertState>().unwrap_or_else(|e| {
            failures.push(StoreError::Decode {
                alert_id,
                field: "state",
                reason: e.to_string(),
            });
            AlertState::default()
        });

        let settings = match self.settings.as_deref() {
            None | Some("") => Value::Null,
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                failures.push(StoreError::Decode {
                    alert_id,
                    field: "settings",
                    reason: e.to_string(),
                });
                Value::Null
            }),
        };

        let eval_data = match self.eval_data.as_deref() {
            None | Some("") => None,
            Some(raw) => match serde_json::from_str(raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    failures.push(StoreError::Decode {
                        alert_id,
                        field: "eval_data",
                        reason: e.to_string(),
                    });
                    None
                }
            },
        };

        let mut timestamp = |field: &'static str, raw: &str| {
            parse_timestamp(raw)
                .map_err(|e| {
                    failures.push(StoreError::Decode {
                        alert_id,
                        field,
                        reason: format!("{e}: {raw:?}"),
                    })
                })
                .ok()
        };

        let created = timestamp("created", &self.created);
        let new_state_date = timestamp("new_state_date", &self.new_state_date);
        let updated = timestamp("updated", &self.updated);
        let eval_date = match self.eval_date.as_deref() {
            None | Some("") => None,
            Some(raw) => timestamp("eval_date", raw),
        };
        // Unreadable dates fall back to `created`, or to the epoch when that is unreadable too.
        let created = created.unwrap_or_default();
        let new_state_date = new_state_date.unwrap_or(created);
        let updated = updated.unwrap_or(created);

        let alert = Alert {
            id: self.id,
            dashboard_id: self.dashboard_id,
            panel_id: self.panel_id,
            name: self.name,
            message: self.message,
            state,
            new_state_date,
            state_changes: self.state_changes,
            frequency: self.frequency,
            for_duration: self.for_duration,
            handler: self.handler,
            silenced: self.silenced,
            execution_error: self.execution_error,
            eval_data,
            eval_date,
            settings,
            created,
            updated,
        };
        (alert, failures)
    }
}

/// Notification delivery bookkeeping for one alert and notifier.
/// Corresponds to the `alert_notification_state` table; rows are scoped to a
/// dashboard and dropped whenever its alerts are resynced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationState {
    pub id: i64,
    pub dashboard_id: i64,
    pub alert_id: i64,
    pub notifier_id: i64,
    pub state: NotificationStateKind,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationStateRow {
    pub id: i64,
    pub dashboard_id: i64,
    pub alert_id: i64,
    pub notifier_id: i64,
    pub state: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationStateRow> for NotificationState {
    type Error = StoreError;

    fn try_from(row: NotificationStateRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<NotificationStateKind>()
            .map_err(|e| StoreError::Decode {
                alert_id: row.alert_id,
                field: "notification state",
                reason: e.to_string(),
            })?;
        Ok(NotificationState {
            id: row.id,
            dashboard_id: row.dashboard_id,
            alert_id: row.alert_id,
            notifier_id: row.notifier_id,
            state,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

/// A saved dashboard, as handed to the alert extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: i64,
    pub title: String,
    pub data: Value,
}
