use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::alerting::error::AlertError;
use crate::alerting::extractor::AlertExtractor;
use crate::db::models::{Alert, Dashboard};
use crate::db::services::AlertStore;

/// Keeps a dashboard's stored alerts equal to what its current definition yields.
///
/// Every save produces a fresh generation: evaluation history of the previous
/// alerts is discarded, since the rules behind them may have changed.
#[derive(Clone)]
pub struct AlertSyncer {
    store: Arc<dyn AlertStore>,
    extractor: Arc<dyn AlertExtractor>,
}

impl AlertSyncer {
    pub fn new(store: Arc<dyn AlertStore>, extractor: Arc<dyn AlertExtractor>) -> Self {
        Self { store, extractor }
    }

    /// Replaces the stored alert set of `dashboard` with a freshly extracted one.
    /// If extraction fails nothing in storage is touched.
    pub async fn sync_dashboard(&self, dashboard: &Dashboard) -> Result<Vec<Alert>, AlertError> {
        let candidates = self.extractor.get_alerts(dashboard)?;
        debug!(dashboard_id = dashboard.id, count = candidates.len(), "Extracted dashboard alerts.");

        let now = Utc::now();
        let alerts = candidates
            .into_iter()
            .map(|mut alert| {
                alert.dashboard_id = dashboard.id;
                alert.reset_runtime(now);
                alert
            })
            .collect();

        let stored = self.store.replace_dashboard_alerts(dashboard.id, alerts).await?;
        info!(dashboard_id = dashboard.id, count = stored.len(), "Dashboard alerts synced.");
        Ok(stored)
    }

    /// Drops every alert of a deleted dashboard.
    pub async fn remove_dashboard(&self, dashboard_id: i64) -> Result<u64, AlertError> {
        let removed = self.store.delete_dashboard_alerts(dashboard_id).await?;
        info!(dashboard_id, removed, "Dashboard alerts removed.");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::extractor::{ExtractionError, MockAlertExtractor};
    use crate::db::enums::AlertState;
    use crate::db::error::StoreError;
    use crate::db::services::MockAlertStore;
    use serde_json::json;

    fn dashboard(id: i64) -> Dashboard {
        Dashboard {
            id,
            title: "Production".to_string(),
            data: json!({"panels": [{"id": 1}, {"id": 2}]}),
        }
    }

    /// A candidate carrying stale runtime history, as an extractor reusing old rows might return.
    fn stale_candidate(panel_id: i64) -> Alert {
        let mut alert = Alert::new(77, panel_id, format!("panel {panel_id}"), json!({"cond": panel_id}));
        alert.id = 500 + panel_id;
        alert.state = AlertState::Alerting;
        alert.state_changes = 12;
        alert.execution_error = Some("old failure".to_string());
        alert.eval_data = Some(json!({"old": true}));
        alert
    }

    #[tokio::test]
    async fn test_extraction_failure_makes_no_storage_changes() {
        let mut extractor = MockAlertExtractor::new();
        extractor.expect_get_alerts().times(1).returning(|d| {
            Err(ExtractionError {
                dashboard_id: d.id,
                reason: "panel 3 has an invalid condition".to_string(),
            })
        });
        // No expectations: any store call panics.
        let store = MockAlertStore::new();

        let syncer = AlertSyncer::new(Arc::new(store), Arc::new(extractor));
        let result = syncer.sync_dashboard(&dashboard(1)).await;

        match result {
            Err(AlertError::Extraction(e)) => assert_eq!(e.dashboard_id, 1),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sync_resets_runtime_fields_and_replaces_once() {
        let mut extractor = MockAlertExtractor::new();
        extractor
            .expect_get_alerts()
            .returning(|_| Ok(vec![stale_candidate(1), stale_candidate(2)]));

        let mut store = MockAlertStore::new();
        store
            .expect_replace_dashboard_alerts()
            .times(1)
            .withf(|dashboard_id, alerts| {
                *dashboard_id == 9
                    && alerts.len() == 2
                    && alerts.iter().all(|a| {
                        a.dashboard_id == 9
                            && a.state == AlertState::Unknown
                            && a.state_changes == 0
                            && a.execution_error.is_none()
                            && a.eval_data.is_none()
                            && a.created == a.updated
                            && a.created == a.new_state_date
                    })
                    && alerts[0].created == alerts[1].created
            })
            .returning(|_, alerts| {
                Ok(alerts
                    .into_iter()
                    .enumerate()
                    .map(|(i, mut a)| {
                        a.id = 1000 + i as i64;
                        a
                    })
                    .collect())
            });

        let syncer = AlertSyncer::new(Arc::new(store), Arc::new(extractor));
        let stored = syncer.sync_dashboard(&dashboard(9)).await.unwrap();

        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, 1000);
        assert_eq!(stored[1].settings, json!({"cond": 2}));
    }

    #[tokio::test]
    async fn test_storage_failure_is_surfaced() {
        let mut extractor = MockAlertExtractor::new();
        extractor.expect_get_alerts().returning(|_| Ok(vec![stale_candidate(1)]));
        let mut store = MockAlertStore::new();
        store
            .expect_replace_dashboard_alerts()
            .times(1)
            .returning(|_, _| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));

        let syncer = AlertSyncer::new(Arc::new(store), Arc::new(extractor));
        let result = syncer.sync_dashboard(&dashboard(1)).await;
        assert!(matches!(
            result,
            Err(AlertError::Storage(StoreError::Database(sqlx::Error::PoolTimedOut)))
        ));
    }

    #[tokio::test]
    async fn test_remove_dashboard() {
        let mut store = MockAlertStore::new();
        store
            .expect_delete_dashboard_alerts()
            .withf(|id| *id == 4)
            .times(1)
            .returning(|_| Ok(3));

        let syncer = AlertSyncer::new(Arc::new(store), Arc::new(MockAlertExtractor::new()));
        assert_eq!(syncer.remove_dashboard(4).await.unwrap(), 3);
    }
}
