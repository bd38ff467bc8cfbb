//! Account activity watching.
//!
//! Each configured account syncs its rooms in its own loop. Rooms are
//! attributed to bridges through explicit room lists or the rooms' bridge
//! state events, and the newest bridged message per bridge is tracked by a
//! [`UserBridgeState`]. A bridge that stays silent longer than its window
//! raises an inactivity alert, optionally after a liveness probe.

pub mod client;
pub mod directory;
pub mod homeserver;
pub mod scanner;
pub mod state;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use client::{
    AccountClient, ClientError, EventKind, JoinedRoom, MessageKind, MessagesPage, SyncSnapshot,
    TimelineEvent,
};
pub use directory::AccountDirectory;
pub use homeserver::HomeserverClient;
pub use scanner::{AccountWatchers, WatchedAccount};
pub use state::{InactivitySettings, LivenessProbeSettings, ProbeRequest, UserBridgeState};

/// What an account loop does besides syncing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWatchSettings {
    /// Rooms whose read marker always follows the newest event.
    #[serde(default)]
    pub auto_mark_read_rooms: Vec<String>,
    /// Rooms marked read only while they carry no notification or highlight.
    #[serde(default)]
    pub auto_mark_read_rooms_without_notification: Vec<String>,
    /// Inactivity watching per bridge id.
    #[serde(default)]
    pub watched_bridges: BTreeMap<String, InactivitySettings>,
}
