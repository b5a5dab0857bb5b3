use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A roster change observed on the transport's dispatch path.
///
/// Changes carry bare addresses (user@domain) as strings so the event model
/// stays wire-format independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RosterChange {
    ContactAdded {
        address: String,
        name: Option<String>,
    },
    ContactRemoved {
        address: String,
    },
    ContactUpdated {
        address: String,
        name: Option<String>,
    },
    PresenceChanged {
        address: String,
        available: bool,
        status: Option<String>,
    },
}

impl RosterChange {
    /// The bare address this change is about.
    pub fn address(&self) -> &str {
        match self {
            RosterChange::ContactAdded { address, .. }
            | RosterChange::ContactRemoved { address }
            | RosterChange::ContactUpdated { address, .. }
            | RosterChange::PresenceChanged { address, .. } => address,
        }
    }
}

/// The event envelope delivered to roster observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEvent {
    /// Unique identifier for this event.
    pub id: Uuid,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,

    /// The change itself.
    pub change: RosterChange,
}

impl RosterEvent {
    pub fn new(change: RosterChange) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            change,
        }
    }
}

/// Broadcast bus for roster events.
///
/// The transport's dispatch path enqueues events here; observers drain them
/// from their own receivers. Events must never mutate session state — they
/// only feed read-only caches and notifications, so delivery is decoupled
/// from the session's transitions.
#[derive(Debug, Clone)]
pub struct RosterEvents {
    sender: broadcast::Sender<RosterEvent>,
}

impl RosterEvents {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers it reached; zero
    /// receivers is not an error.
    pub fn publish(&self, event: RosterEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for RosterEvents {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
