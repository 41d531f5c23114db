//! Alert lifecycle for dashboards: keeping the stored alert set in line with
//! saved dashboards, and recording evaluation outcomes against it.

pub mod alerting;
pub mod config;
pub mod db;
pub mod logging;
