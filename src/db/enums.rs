use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognised {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Runtime evaluation state of an alert, stored in `alert.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Unknown,
    Pending,
    Ok,
    Alerting,
    Paused,
    NoData,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Unknown => "unknown",
            AlertState::Pending => "pending",
            AlertState::Ok => "ok",
            AlertState::Alerting => "alerting",
            AlertState::Paused => "paused",
            AlertState::NoData => "no_data",
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, AlertState::Paused)
    }
}

impl FromStr for AlertState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(AlertState::Unknown),
            "pending" => Ok(AlertState::Pending),
            "ok" => Ok(AlertState::Ok),
            "alerting" => Ok(AlertState::Alerting),
            "paused" => Ok(AlertState::Paused),
            "no_data" => Ok(AlertState::NoData),
            _ => Err(ParseEnumError {
                kind: "alert state",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery bookkeeping for one (alert, notifier) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStateKind {
    Pending,
    Completed,
}

impl NotificationStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStateKind::Pending => "pending",
            NotificationStateKind::Completed => "completed",
        }
    }
}

impl FromStr for NotificationStateKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStateKind::Pending),
            "completed" => Ok(NotificationStateKind::Completed),
            _ => Err(ParseEnumError {
                kind: "notification state",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for NotificationStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
