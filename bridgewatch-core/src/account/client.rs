//! Port to the homeserver an account lives on.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to a homeserver.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The homeserver answered with a non-success status.
    #[error("homeserver returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured homeserver is not a usable base URL.
    #[error("invalid homeserver url {0}")]
    InvalidHomeserver(String),
}

/// Coarse event type, as far as activity tracking cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `m.room.message`
    Message,
    /// `m.room.encrypted`
    Encrypted,
    /// Anything else.
    Other,
}

/// A timeline event reduced to what activity tracking reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    /// Event id, e.g. `$abc`.
    pub event_id: String,
    /// Account id of the sender.
    pub sender: String,
    /// Event type class.
    pub kind: EventKind,
    /// Milliseconds since the Unix epoch.
    pub origin_server_ts: i64,
}

impl TimelineEvent {
    /// Plain or encrypted room messages; only these count as bridge activity.
    pub fn is_message(&self) -> bool {
        matches!(self.kind, EventKind::Message | EventKind::Encrypted)
    }
}

/// Unread counters of a joined room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadCounts {
    /// Unread events that notify.
    pub notification_count: u64,
    /// Unread events that highlight, e.g. mentions.
    pub highlight_count: u64,
}

impl UnreadCounts {
    /// No notification and no highlight pending.
    pub fn is_empty(&self) -> bool {
        self.notification_count == 0 && self.highlight_count == 0
    }
}

/// How an outgoing message presents to room members. Notices do not ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `m.text`
    Text,
    /// `m.notice`
    Notice,
}

impl MessageKind {
    /// The `msgtype` content field.
    pub fn msgtype(self) -> &'static str {
        match self {
            Self::Text => "m.text",
            Self::Notice => "m.notice",
        }
    }
}

/// A joined room as delivered by one sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    /// Room id, e.g. `!abc:example.org`.
    pub room_id: String,
    /// Live timeline of this sync, oldest first.
    pub timeline: Vec<TimelineEvent>,
    /// Token to page backwards from the start of `timeline`.
    pub prev_batch: Option<String>,
    /// Unread counters after this sync.
    pub unread: UnreadCounts,
}

/// Result of one sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    /// Token for the next incremental sync.
    pub next_batch: String,
    /// Joined rooms with changes since the previous sync.
    pub joined: Vec<JoinedRoom>,
}

/// One page of backwards history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagesPage {
    /// Newest first.
    pub chunk: Vec<TimelineEvent>,
    /// Token for the next page; `None` when history is exhausted.
    pub end: Option<String>,
}

/// The client-server calls an account loop and the notifiers need.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Fully qualified id of the logged-in account.
    fn account_id(&self) -> &str;

    /// Long-poll for changes since `since`, or a full sync without a token.
    async fn sync(&self, since: Option<&str>, timeout: Duration) -> Result<SyncSnapshot, ClientError>;

    /// Bridge ids announced by the room's bridge state events, in state order.
    async fn room_bridge_ids(&self, room_id: &str) -> Result<Vec<String>, ClientError>;

    /// One page of history older than `from`.
    async fn room_messages_backward(
        &self,
        room_id: &str,
        from: Option<&str>,
    ) -> Result<MessagesPage, ClientError>;

    /// Move both the fully-read marker and the read receipt to `event_id`.
    async fn set_read_markers(&self, room_id: &str, event_id: &str) -> Result<(), ClientError>;

    /// Post a plain-text message.
    async fn send_message(&self, room_id: &str, kind: MessageKind, body: &str) -> Result<(), ClientError>;
}
