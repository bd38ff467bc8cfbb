//! Outbound listener contracts and the built-in listeners.
//!
//! Listener collections are built once at startup and handed to every
//! watcher as an immutable slice. Dispatch runs on the watcher's own task;
//! a failing listener is logged and never stops the remaining ones.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::account::client::{AccountClient, MessageKind};
use crate::looper::panic_message;
use crate::status::StatusState;

/// Result of one bridge status reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeUpdate {
    /// Configured bridge id, e.g. `signal`.
    pub bridge_id: String,
    /// Configured label of the watched account on this bridge.
    pub account_label: String,
    /// Account id the bridge serves.
    pub account_id: String,
    /// State observed in this reconciliation.
    pub state: StatusState,
    /// State carried by the previous update of this watcher, if any.
    pub previous_state: Option<StatusState>,
    /// `state` is in the GOOD class.
    pub is_good: bool,
    /// `state` is outside the OK class.
    pub is_bad: bool,
    /// Start of the current bad streak.
    pub bad_since: Option<DateTime<Utc>>,
    /// Whether this update should be escalated.
    pub alert: bool,
}

impl BridgeUpdate {
    /// Whether `state` differs from the previously reported state.
    pub fn state_changed(&self) -> bool {
        self.previous_state != Some(self.state)
    }
}

/// Result of an account activity evaluation. `bridge_id` is `None` for
/// account-wide problems such as a failed sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountActivityUpdate {
    /// Watched account.
    pub account_id: String,
    /// Bridge the update is about.
    pub bridge_id: Option<String>,
    /// Recent bridged traffic was seen.
    pub is_good: bool,
    /// Whether this update should be escalated.
    pub alert: bool,
    /// Human readable detail, e.g. the time of the last bridged message.
    pub info: Option<String>,
}

/// Receives every bridge status reconciliation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BridgeStatusListener: Send + Sync {
    /// Called once per reconciliation, on the watcher's task.
    async fn bridge_update(&self, update: &BridgeUpdate) -> anyhow::Result<()>;
}

/// Receives account activity evaluations and account-wide problems.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountActivityListener: Send + Sync {
    /// Called on the account loop's task.
    async fn account_activity_update(&self, update: &AccountActivityUpdate) -> anyhow::Result<()>;
}

/// Receives raw bodies posted to the push endpoint.
#[async_trait]
pub trait PushReceiver: Send + Sync {
    /// `body` is passed on verbatim and may not be valid JSON.
    async fn receive_push(&self, body: &[u8]) -> anyhow::Result<()>;
}

/// Bridge listeners shared by every watcher.
pub type BridgeListeners = Arc<[Arc<dyn BridgeStatusListener>]>;
/// Activity listeners shared by every account loop.
pub type ActivityListeners = Arc<[Arc<dyn AccountActivityListener>]>;

/// Deliver `update` to every listener in order. A listener that fails or
/// panics is logged and the remaining listeners still run.
pub async fn dispatch_bridge_update(
    listeners: &[Arc<dyn BridgeStatusListener>],
    update: &BridgeUpdate,
) {
    for listener in listeners {
        let outcome = AssertUnwindSafe(async { listener.bridge_update(update).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                bridge = %update.bridge_id,
                account = %update.account_label,
                "Exception trying to update listener: {:#}",
                e
            ),
            Err(panic) => error!(
                bridge = %update.bridge_id,
                account = %update.account_label,
                "Listener panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    }
}

/// Same as [`dispatch_bridge_update`] for account activity updates.
pub async fn dispatch_activity_update(
    listeners: &[Arc<dyn AccountActivityListener>],
    update: &AccountActivityUpdate,
) {
    for listener in listeners {
        let outcome = AssertUnwindSafe(async { listener.account_activity_update(update).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                account = %update.account_id,
                "Exception trying to update listener: {:#}",
                e
            ),
            Err(panic) => error!(
                account = %update.account_id,
                "Listener panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    }
}

/// Logs every update and every raw push.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusLogger;

#[async_trait]
impl BridgeStatusListener for StatusLogger {
    async fn bridge_update(&self, update: &BridgeUpdate) -> anyhow::Result<()> {
        if update.state_changed() || update.alert {
            info!(
                bridge = %update.bridge_id,
                account = %update.account_label,
                account_id = %update.account_id,
                state = %update.state,
                alert = update.alert,
                "Received bridge update"
            );
        } else {
            debug!(
                bridge = %update.bridge_id,
                account = %update.account_label,
                state = %update.state,
                "Received bridge update"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl AccountActivityListener for StatusLogger {
    async fn account_activity_update(&self, update: &AccountActivityUpdate) -> anyhow::Result<()> {
        let bridge = update.bridge_id.as_deref().unwrap_or("-");
        let info = update.info.as_deref().unwrap_or("");
        if update.is_good {
            info!(account = %update.account_id, bridge, "Account activity ok: {}", info);
        } else {
            warn!(
                account = %update.account_id,
                bridge,
                alert = update.alert,
                "Account activity degraded: {}",
                info
            );
        }
        Ok(())
    }
}

#[async_trait]
impl PushReceiver for StatusLogger {
    async fn receive_push(&self, body: &[u8]) -> anyhow::Result<()> {
        info!("Received data: {}", String::from_utf8_lossy(body));
        Ok(())
    }
}

/// Posts a one-line plain-text message per relevant update into a room.
/// Alerts are sent as `m.text`, the rest as `m.notice`.
pub struct RoomNotifier {
    client: Arc<dyn AccountClient>,
    room_id: String,
}

impl std::fmt::Debug for RoomNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomNotifier")
            .field("account", &self.client.account_id())
            .field("room_id", &self.room_id)
            .finish()
    }
}

impl RoomNotifier {
    /// Post into `room_id` as the account behind `client`.
    pub fn new(client: Arc<dyn AccountClient>, room_id: impl Into<String>) -> Self {
        Self {
            client,
            room_id: room_id.into(),
        }
    }

    /// Alerts ping the room, everything else is posted as a notice.
    fn kind(alert: bool) -> MessageKind {
        if alert {
            MessageKind::Text
        } else {
            MessageKind::Notice
        }
    }

    /// `[STATE] bridge label`
    pub fn bridge_line(update: &BridgeUpdate) -> String {
        format!("[{}] {} {}", update.state, update.bridge_id, update.account_label)
    }

    /// `[OK]` or `[ALERT]`, then the bridge and account, then the info text.
    pub fn activity_line(update: &AccountActivityUpdate) -> String {
        let tag = if update.is_good { "[OK]" } else { "[ALERT]" };
        match &update.bridge_id {
            Some(bridge) => match &update.info {
                Some(info) => format!("{tag} {bridge} {}: {info}", update.account_id),
                None => format!("{tag} {bridge} {}", update.account_id),
            },
            None => format!(
                "{tag} {}: {}",
                update.account_id,
                update.info.as_deref().unwrap_or("unexpected update")
            ),
        }
    }
}

#[async_trait]
impl BridgeStatusListener for RoomNotifier {
    async fn bridge_update(&self, update: &BridgeUpdate) -> anyhow::Result<()> {
        if !update.state_changed() && !update.alert {
            return Ok(());
        }
        self.client
            .send_message(&self.room_id, Self::kind(update.alert), &Self::bridge_line(update))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountActivityListener for RoomNotifier {
    async fn account_activity_update(&self, update: &AccountActivityUpdate) -> anyhow::Result<()> {
        self.client
            .send_message(&self.room_id, Self::kind(update.alert), &Self::activity_line(update))
            .await?;
        Ok(())
    }
}
