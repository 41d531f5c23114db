use thiserror::Error;

use crate::alerting::extractor::ExtractionError;
use crate::db::enums::AlertState;
use crate::db::error::StoreError;

/// Errors surfaced by the alert syncer and state machine.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Cannot change state on paused alert {0}")]
    PausedState(i64),
    #[error("Alert {0} is already in state {1}")]
    NoStateChange(i64, AlertState),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("Storage error: {0}")]
    Storage(StoreError),
    #[error("Decode error: {0}")]
    Decode(StoreError),
}

impl From<StoreError> for AlertError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Decode { .. } => AlertError::Decode(e),
            other => AlertError::Storage(other),
        }
    }
}

impl AlertError {
    /// True for outcomes callers branch on rather than report.
    pub fn is_expected(&self) -> bool {
        matches!(self, AlertError::PausedState(_) | AlertError::NoStateChange(..))
    }
}
