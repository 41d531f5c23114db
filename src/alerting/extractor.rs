use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::db::models::{Alert, Dashboard};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to extract alerts from dashboard {dashboard_id}: {reason}")]
pub struct ExtractionError {
    pub dashboard_id: i64,
    pub reason: String,
}

/// Derives candidate alert definitions from a dashboard's panel configuration.
///
/// Implementations live outside this crate. Candidates should be built with
/// [`Alert::new`]; their ids and runtime fields are replaced on sync.
#[cfg_attr(test, automock)]
pub trait AlertExtractor: Send + Sync {
    fn get_alerts(&self, dashboard: &Dashboard) -> Result<Vec<Alert>, ExtractionError>;
}
