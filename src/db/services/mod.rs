//! Data access for alert rows and notification state.
//!
//! Everything is re-exported here so callers use `crate::db::services::*`.

pub mod alert_service;

pub use alert_service::*;
