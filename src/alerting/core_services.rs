use std::sync::Arc;
use tracing::info;

use crate::alerting::extractor::AlertExtractor;
use crate::alerting::state_service::AlertStateMachine;
use crate::alerting::sync_service::AlertSyncer;
use crate::config::AlertingConfig;
use crate::db::error::StoreError;
use crate::db::services::{AlertStore, SqliteAlertStore};

/// Shared handles for one alerting database.
/// The syncer and the state machine operate on the same store.
#[derive(Clone)]
pub struct AlertingCore {
    pub store: Arc<SqliteAlertStore>,
    pub syncer: AlertSyncer,
    pub state_machine: AlertStateMachine,
}

impl AlertingCore {
    /// Opens the configured database, brings its schema up to date and wires
    /// the components around it.
    pub async fn connect(
        config: &AlertingConfig,
        extractor: Arc<dyn AlertExtractor>,
    ) -> Result<Self, StoreError> {
        let store = Arc::new(SqliteAlertStore::connect(config).await?);
        store.run_migrations().await?;

        let core = Self::from_store(store, extractor);
        info!("Alerting core initialized.");
        Ok(core)
    }

    pub fn from_store(store: Arc<SqliteAlertStore>, extractor: Arc<dyn AlertExtractor>) -> Self {
        let shared: Arc<dyn AlertStore> = store.clone();
        Self {
            syncer: AlertSyncer::new(shared.clone(), extractor),
            state_machine: AlertStateMachine::new(shared),
            store,
        }
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::extractor::MockAlertExtractor;
    use crate::db::enums::AlertState;
    use crate::db::models::{Alert, Dashboard};
    use serde_json::json;

    #[tokio::test]
    async fn test_components_share_one_store() {
        let mut extractor = MockAlertExtractor::new();
        extractor
            .expect_get_alerts()
            .returning(|d| Ok(vec![Alert::new(d.id, 1, "Latency", json!({"threshold": 250}))]));

        let core = AlertingCore::connect(&AlertingConfig::in_memory(), Arc::new(extractor))
            .await
            .unwrap();

        let dashboard = Dashboard {
            id: 3,
            title: "API".to_string(),
            data: json!({}),
        };
        let synced = core.syncer.sync_dashboard(&dashboard).await.unwrap();
        let alert = core
            .state_machine
            .set_alert_state(synced[0].id, AlertState::Pending, None, None)
            .await
            .unwrap();

        let stored = core.store.get_by_id(alert.id).await.unwrap();
        assert_eq!(stored.state, AlertState::Pending);
        assert_eq!(stored.state_changes, 1);
        core.close().await;
    }
}
