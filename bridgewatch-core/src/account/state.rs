//! Per (account, bridge) inactivity tracking.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::TimelineEvent;
use crate::listeners::AccountActivityUpdate;
use crate::status::hysteresis::to_delta;

/// Probe message sent before an inactivity alert is let through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessProbeSettings {
    /// Seconds to wait for bridged traffic after a probe before alerting.
    pub delay_alert: u64,
    /// Account that sends the probe. Must be a configured account.
    pub send_user: String,
    /// Room the probe is posted into, usually a bridged room.
    pub send_room: String,
    /// Body of the probe message.
    pub send_text: String,
}

/// Inactivity watching of one bridge on one account. Durations are seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivitySettings {
    /// Silence tolerated before the bridge counts as inactive.
    pub alert_after_inactivity: u64,
    /// Minimum spacing of repeated inactivity alerts.
    pub alert_period: u64,
    /// Rooms attributed to this bridge regardless of their bridge state events.
    #[serde(default)]
    pub explicit_rooms: Vec<String>,
    /// Only messages from this sender count as bridge activity.
    #[serde(default)]
    pub required_sender: Option<String>,
    /// Send a probe first and alert only if it stays unanswered.
    #[serde(default)]
    pub liveness_probe: Option<LivenessProbeSettings>,
}

impl InactivitySettings {
    /// [`Self::alert_after_inactivity`] as a duration.
    pub fn alert_after_inactivity(&self) -> Duration {
        Duration::from_secs(self.alert_after_inactivity)
    }

    /// [`Self::alert_period`] as a duration.
    pub fn alert_period(&self) -> Duration {
        Duration::from_secs(self.alert_period)
    }
}

/// A probe message the scanner should send on behalf of `sender`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Configured account the probe is sent as.
    pub sender: String,
    /// Target room.
    pub room_id: String,
    /// Message body.
    pub text: String,
}

/// Outcome of [`UserBridgeState::evaluate`] when something is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvaluation {
    /// Probe to send before the update is dispatched.
    pub probe: Option<ProbeRequest>,
    /// Update for the activity listeners.
    pub update: AccountActivityUpdate,
}

/// Newest bridged message seen for one (account, bridge) pair, plus what
/// was last reported about it.
#[derive(Debug, Clone)]
pub struct UserBridgeState {
    bridge_id: String,
    settings: InactivitySettings,
    /// Milliseconds since the epoch.
    last_bridged_message_ts: Option<i64>,
    last_update_was_good: bool,
    last_alert_ts: Option<DateTime<Utc>>,
    last_not_good_notify_ts: Option<DateTime<Utc>>,
    posted_any_update: bool,
    last_probe_ts: Option<DateTime<Utc>>,
}

impl UserBridgeState {
    /// Fresh state: nothing seen, nothing posted yet.
    pub fn new(bridge_id: impl Into<String>, settings: InactivitySettings) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            settings,
            last_bridged_message_ts: None,
            last_update_was_good: true,
            last_alert_ts: None,
            last_not_good_notify_ts: None,
            posted_any_update: false,
            last_probe_ts: None,
        }
    }

    /// Watched bridge id.
    pub fn bridge_id(&self) -> &str {
        &self.bridge_id
    }

    /// Timestamp of the newest bridged message, in epoch milliseconds.
    pub fn last_bridged_message_ts(&self) -> Option<i64> {
        self.last_bridged_message_ts
    }

    /// Whether `room_id` is listed in the explicit rooms.
    pub fn claims_room(&self, room_id: &str) -> bool {
        self.settings.explicit_rooms.iter().any(|room| room == room_id)
    }

    /// Record `event` if it is bridge activity. Returns whether it was.
    ///
    /// Messages written by the watched account itself are never counted:
    /// they may be echoes that say nothing about the bridge.
    pub fn observe(&mut self, event: &TimelineEvent, own_account_id: &str) -> bool {
        if event.sender == own_account_id {
            return false;
        }
        if let Some(required) = &self.settings.required_sender
            && *required != event.sender
        {
            return false;
        }
        if !event.is_message() {
            return false;
        }
        self.last_bridged_message_ts = Some(
            self.last_bridged_message_ts
                .map_or(event.origin_server_ts, |ts| ts.max(event.origin_server_ts)),
        );
        true
    }

    /// Events older than this (ms) cannot change the verdict at `now`.
    pub fn oldest_interesting_ts(&self, now: DateTime<Utc>) -> i64 {
        now.checked_sub_signed(to_delta(self.settings.alert_after_inactivity()))
            .map_or(i64::MIN, |cutoff| cutoff.timestamp_millis())
    }

    /// Whether the bridge has been silent for longer than the window.
    /// Never having seen a message counts as silent.
    pub fn is_alerting(&self, now: DateTime<Utc>) -> bool {
        match self.last_bridged_message_ts {
            None => true,
            Some(ts) => {
                let silence_ms = now.timestamp_millis().saturating_sub(ts);
                silence_ms > to_delta(self.settings.alert_after_inactivity()).num_milliseconds()
            }
        }
    }

    fn info(&self) -> String {
        match self
            .last_bridged_message_ts
            .and_then(DateTime::<Utc>::from_timestamp_millis)
        {
            Some(ts) => format!("Last received message: {}", ts.to_rfc3339()),
            None => "No recent message found".to_owned(),
        }
    }

    /// Decide whether an update is due at `now` and update the bookkeeping
    /// as if it was posted. `None` means nothing is to be reported.
    pub fn evaluate(&mut self, now: DateTime<Utc>, account_id: &str) -> Option<ActivityEvaluation> {
        let alerting = self.is_alerting(now);

        let due = !self.posted_any_update
            || (!self.last_update_was_good && !alerting)
            || (alerting
                && self.last_alert_ts.is_none_or(|last| {
                    now - last >= to_delta(self.settings.alert_period())
                }));
        if !due {
            return None;
        }

        let is_good = !alerting;
        let mut alert = alerting;
        let mut probe = None;

        if alerting && let Some(probe_settings) = &self.settings.liveness_probe {
            let probe_is_stale = match (self.last_probe_ts, self.last_not_good_notify_ts) {
                (Some(sent), Some(notified)) => sent < notified,
                _ => true,
            };

            if probe_is_stale {
                self.last_probe_ts = Some(now);
                probe = Some(ProbeRequest {
                    sender: probe_settings.send_user.clone(),
                    room_id: probe_settings.send_room.clone(),
                    text: probe_settings.send_text.clone(),
                });
                alert = false;
            } else if self.last_probe_ts.is_some_and(|sent| {
                now - sent <= to_delta(Duration::from_secs(probe_settings.delay_alert))
            }) {
                if self.posted_any_update {
                    return None;
                }
                alert = false;
            }
        }

        self.posted_any_update = true;
        self.last_alert_ts = alert.then_some(now);
        self.last_not_good_notify_ts = (!is_good).then_some(now);
        self.last_update_was_good = is_good;

        Some(ActivityEvaluation {
            probe,
            update: AccountActivityUpdate {
                account_id: account_id.to_owned(),
                bridge_id: Some(self.bridge_id.clone()),
                is_good,
                alert,
                info: Some(self.info()),
            },
        })
    }
}
