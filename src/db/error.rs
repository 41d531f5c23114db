use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Alert not found: {0}")]
    NotFound(i64),
    /// The row exists but its `state_changes` no longer matches the version the
    /// caller read.
    #[error("Alert {0} was modified concurrently")]
    Conflict(i64),
    #[error("Failed to decode {field} of alert {alert_id}: {reason}")]
    Decode {
        alert_id: i64,
        field: &'static str,
        reason: String,
    },
    #[error("Failed to encode {field}: {source}")]
    Encode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
