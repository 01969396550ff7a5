//! Append-only activity log of everything the simulated broker does.

use crate::domain::{OrderId, PositionKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    OrderPlaced,
    OrderModified,
    OrderCancelled,
    OrderFilled,
    PositionCreated,
    PositionUpdated,
    PositionClosed,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityKind::OrderPlaced => "order placed",
            ActivityKind::OrderModified => "order modified",
            ActivityKind::OrderCancelled => "order cancelled",
            ActivityKind::OrderFilled => "order filled",
            ActivityKind::PositionCreated => "position created",
            ActivityKind::PositionUpdated => "position updated",
            ActivityKind::PositionClosed => "position closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub time: DateTime<Utc>,
    pub kind: ActivityKind,
    pub key: PositionKey,
    pub order_id: Option<OrderId>,
    pub message: String,
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.time.to_rfc3339(), self.kind, self.key)?;
        if let Some(id) = self.order_id {
            write!(f, " {id}")?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        time: DateTime<Utc>,
        kind: ActivityKind,
        key: &PositionKey,
        order_id: Option<OrderId>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        debug!(
            account = %key.account,
            symbol = %key.symbol,
            order_id = ?order_id,
            "{kind}: {message}"
        );
        self.entries.push(ActivityEntry {
            time,
            kind,
            key: key.clone(),
            order_id,
            message,
        });
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: ActivityKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}
