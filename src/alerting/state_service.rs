use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::alerting::error::AlertError;
use crate::db::enums::AlertState;
use crate::db::models::Alert;
use crate::db::services::AlertStore;

/// Applies one evaluation outcome to `alert` in memory.
///
/// Paused alerts and same-state transitions are rejected without touching
/// `alert`. On success returns the `state_changes` value the alert had before,
/// which is the version the stored row must still carry.
pub fn apply_state_change(
    alert: &mut Alert,
    new_state: AlertState,
    eval_data: Option<Value>,
    execution_error: Option<String>,
    now: DateTime<Utc>,
) -> Result<i64, AlertError> {
    if alert.state.is_paused() {
        return Err(AlertError::PausedState(alert.id));
    }
    if alert.state == new_state {
        return Err(AlertError::NoStateChange(alert.id, new_state));
    }

    let previous_state_changes = alert.state_changes;
    alert.state = new_state;
    alert.state_changes += 1;
    alert.new_state_date = now;
    alert.updated = now;
    alert.eval_data = eval_data;
    alert.execution_error = execution_error;
    Ok(previous_state_changes)
}

/// Records evaluation outcomes against stored alerts.
#[derive(Clone)]
pub struct AlertStateMachine {
    store: Arc<dyn AlertStore>,
}

impl AlertStateMachine {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Moves alert `alert_id` to `new_state` and persists the runtime fields.
    ///
    /// `execution_error` is written exactly as given; `None` clears a previous
    /// error. Fails with [`AlertError::PausedState`] or
    /// [`AlertError::NoStateChange`] without writing anything.
    pub async fn set_alert_state(
        &self,
        alert_id: i64,
        new_state: AlertState,
        eval_data: Option<Value>,
        execution_error: Option<String>,
    ) -> Result<Alert, AlertError> {
        let mut alert = self.store.get_by_id(alert_id).await?;
        let old_state = alert.state;

        let expected_state_changes =
            apply_state_change(&mut alert, new_state, eval_data, execution_error, Utc::now())?;

        self.store
            .update_runtime_fields(&alert, expected_state_changes)
            .await?;

        debug!(
            alert_id,
            dashboard_id = alert.dashboard_id,
            from = %old_state,
            to = %new_state,
            state_changes = alert.state_changes,
            "Alert state changed."
        );
        Ok(alert)
    }
}
