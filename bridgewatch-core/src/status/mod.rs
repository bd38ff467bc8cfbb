//! Bridge state model shared by the push and poll paths.

pub mod hysteresis;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use hysteresis::{AlertDecision, AlertHysteresis};

/// Remote connection state as reported by a bridge.
///
/// `Unreachable` is never sent by a bridge; it is derived locally when the
/// status endpoint cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusState {
    /// The bridge process is starting up.
    Starting,
    /// The bridge has no login for this account.
    Unconfigured,
    /// The bridge process runs, remote state unknown.
    Running,
    /// The bridge cannot reach the homeserver.
    BridgeUnreachable,
    /// Connecting to the remote network.
    Connecting,
    /// Connected and catching up on history.
    Backfilling,
    /// Connected to the remote network.
    Connected,
    /// Briefly disconnected, reconnecting on its own.
    TransientDisconnect,
    /// The remote network rejected the credentials.
    BadCredentials,
    /// The bridge reported an error it could not classify.
    UnknownError,
    /// The remote session was logged out.
    LoggedOut,
    /// The status endpoint could not be read.
    Unreachable,
}

/// Health class of a state. `Good` implies OK; everything not OK is bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Fully working.
    Good,
    /// Degraded but expected to recover without intervention.
    Ok,
    /// Needs attention.
    Bad,
}

impl StatusState {
    /// Health class of this state.
    pub fn classify(self) -> StatusClass {
        match self {
            StatusState::Connected | StatusState::Backfilling => StatusClass::Good,
            StatusState::TransientDisconnect | StatusState::Connecting => StatusClass::Ok,
            _ => StatusClass::Bad,
        }
    }

    /// `CONNECTED` or `BACKFILLING`.
    pub fn is_good(self) -> bool {
        self.classify() == StatusClass::Good
    }

    /// Anything outside the OK class.
    pub fn is_bad(self) -> bool {
        self.classify() == StatusClass::Bad
    }

    /// Wire name, e.g. `BAD_CREDENTIALS`.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusState::Starting => "STARTING",
            StatusState::Unconfigured => "UNCONFIGURED",
            StatusState::Running => "RUNNING",
            StatusState::BridgeUnreachable => "BRIDGE_UNREACHABLE",
            StatusState::Connecting => "CONNECTING",
            StatusState::Backfilling => "BACKFILLING",
            StatusState::Connected => "CONNECTED",
            StatusState::TransientDisconnect => "TRANSIENT_DISCONNECT",
            StatusState::BadCredentials => "BAD_CREDENTIALS",
            StatusState::UnknownError => "UNKNOWN_ERROR",
            StatusState::LoggedOut => "LOGGED_OUT",
            StatusState::Unreachable => "UNREACHABLE",
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single status report, either pushed to the listen endpoint or taken
/// from a `remoteState` entry of a poll response.
///
/// Poll entries carry no account id; pushed payloads always do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Account the state belongs to. Sent as `user_id`.
    #[serde(rename = "user_id", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Id of the account on the remote network.
    pub remote_id: String,
    /// Display name on the remote network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    /// Reported state.
    pub state_event: StatusState,
    /// Seconds until the bridge expects to be asked again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl StatusPayload {
    /// Parse a pushed body.
    pub fn parse(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }
}

/// Body of a status endpoint poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteStateResponse {
    /// Entries keyed by remote id.
    #[serde(rename = "remoteState", default)]
    pub remote_state: BTreeMap<String, StatusPayload>,
}
