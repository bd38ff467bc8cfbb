//! Minimal client-server API client over reqwest.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::client::{
    AccountClient, ClientError, EventKind, JoinedRoom, MessageKind, MessagesPage, SyncSnapshot,
    TimelineEvent, UnreadCounts,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BRIDGE_STATE_EVENT_TYPES: [&str; 2] = ["m.bridge", "uk.half-shot.bridge"];

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    origin_server_ts: i64,
    #[serde(default)]
    content: Value,
}

impl RawEvent {
    fn into_timeline_event(self) -> TimelineEvent {
        let kind = match self.event_type.as_str() {
            "m.room.message" => EventKind::Message,
            "m.room.encrypted" => EventKind::Encrypted,
            _ => EventKind::Other,
        };
        TimelineEvent {
            event_id: self.event_id,
            sender: self.sender,
            kind,
            origin_server_ts: self.origin_server_ts,
        }
    }

    fn bridge_id(&self) -> Option<&str> {
        if !BRIDGE_STATE_EVENT_TYPES.contains(&self.event_type.as_str()) {
            return None;
        }
        self.content.get("protocol")?.get("id")?.as_str()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawTimeline {
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    prev_batch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUnread {
    #[serde(default)]
    notification_count: u64,
    #[serde(default)]
    highlight_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawJoinedRoom {
    #[serde(default)]
    timeline: RawTimeline,
    #[serde(default)]
    unread_notifications: RawUnread,
}

#[derive(Debug, Default, Deserialize)]
struct RawRooms {
    #[serde(default)]
    join: BTreeMap<String, RawJoinedRoom>,
}

#[derive(Debug, Deserialize)]
struct RawSync {
    next_batch: String,
    #[serde(default)]
    rooms: RawRooms,
}

impl From<RawSync> for SyncSnapshot {
    fn from(raw: RawSync) -> Self {
        let joined = raw
            .rooms
            .join
            .into_iter()
            .map(|(room_id, room)| JoinedRoom {
                room_id,
                timeline: room
                    .timeline
                    .events
                    .into_iter()
                    .map(RawEvent::into_timeline_event)
                    .collect(),
                prev_batch: room.timeline.prev_batch,
                unread: UnreadCounts {
                    notification_count: room.unread_notifications.notification_count,
                    highlight_count: room.unread_notifications.highlight_count,
                },
            })
            .collect();

        Self {
            next_batch: raw.next_batch,
            joined,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessages {
    #[serde(default)]
    chunk: Vec<RawEvent>,
    #[serde(default)]
    end: Option<String>,
}

/// Bridge ids of the bridge state events, deduplicated, in state order.
fn bridge_ids(state: &[RawEvent]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in state.iter().filter_map(RawEvent::bridge_id) {
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_owned());
        }
    }
    ids
}

fn message_content(kind: MessageKind, body: &str) -> Value {
    json!({ "msgtype": kind.msgtype(), "body": body })
}

/// One logged-in account on a homeserver.
#[derive(Clone)]
pub struct HomeserverClient {
    http: reqwest::Client,
    base: Url,
    account_id: String,
    access_token: String,
}

impl std::fmt::Debug for HomeserverClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeserverClient")
            .field("base", &self.base.as_str())
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl HomeserverClient {
    /// Client for `account_id` on `homeserver`, authenticated with
    /// `access_token`. The homeserver must be an absolute base URL.
    pub fn new(
        http: reqwest::Client,
        homeserver: &str,
        account_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let base = Url::parse(homeserver)
            .map_err(|e| ClientError::InvalidHomeserver(format!("{homeserver}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidHomeserver(homeserver.to_owned()));
        }
        Ok(Self {
            http,
            base,
            account_id: account_id.into(),
            access_token: access_token.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidHomeserver(self.base.to_string()))?
            .pop_if_empty()
            .extend(["_matrix", "client", "v3"])
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl AccountClient for HomeserverClient {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn sync(&self, since: Option<&str>, timeout: Duration) -> Result<SyncSnapshot, ClientError> {
        let mut url = self.endpoint(&["sync"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &timeout.as_millis().to_string());
            if let Some(since) = since {
                query.append_pair("since", since);
            }
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(timeout + REQUEST_TIMEOUT)
            .send()
            .await?;
        let raw: RawSync = Self::read_json(response).await?;
        Ok(raw.into())
    }

    async fn room_bridge_ids(&self, room_id: &str) -> Result<Vec<String>, ClientError> {
        let url = self.endpoint(&["rooms", room_id, "state"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let state: Vec<RawEvent> = Self::read_json(response).await?;
        Ok(bridge_ids(&state))
    }

    async fn room_messages_backward(
        &self,
        room_id: &str,
        from: Option<&str>,
    ) -> Result<MessagesPage, ClientError> {
        let mut url = self.endpoint(&["rooms", room_id, "messages"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("dir", "b");
            if let Some(from) = from {
                query.append_pair("from", from);
            }
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let raw: RawMessages = Self::read_json(response).await?;
        Ok(MessagesPage {
            chunk: raw
                .chunk
                .into_iter()
                .map(RawEvent::into_timeline_event)
                .collect(),
            end: raw.end,
        })
    }

    async fn set_read_markers(&self, room_id: &str, event_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["rooms", room_id, "read_markers"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "m.fully_read": event_id, "m.read": event_id }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let _: Value = Self::read_json(response).await?;
        Ok(())
    }

    async fn send_message(&self, room_id: &str, kind: MessageKind, body: &str) -> Result<(), ClientError> {
        let txn_id = Uuid::new_v4().to_string();
        let url = self.endpoint(&["rooms", room_id, "send", "m.room.message", &txn_id])?;
        let response = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&message_content(kind, body))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let _: Value = Self::read_json(response).await?;
        debug!(account = %self.account_id, room = %room_id, "Sent message");
        Ok(())
    }
}
