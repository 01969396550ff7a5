//! User-visible alerts, accumulated and drained by the caller.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub time: DateTime<Utc>,
    pub level: AlertLevel,
    /// Where it came from, e.g. the signal name.
    pub source: String,
    pub message: String,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?}] {}: {}",
            self.time.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.source,
            self.message
        )
    }
}

/// Pull-based alert queue: producers push, the owner drains with get-and-clear.
#[derive(Debug, Default)]
pub struct AlertQueue {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: AlertLevel, source: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            AlertLevel::Info => info!(source, "{message}"),
            AlertLevel::Warning => warn!(source, "{message}"),
            AlertLevel::Error => error!(source, "{message}"),
        }
        self.alerts.lock().push(Alert {
            time: Utc::now(),
            level,
            source: source.to_string(),
            message,
        });
    }

    /// Take every pending alert, leaving the queue empty.
    pub fn drain(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock())
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}
