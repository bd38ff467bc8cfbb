//! Per-bridge status watching.
//!
//! Every configured (bridge, account) pair gets a [`BridgeWatcher`] with its
//! own [`Looper`](crate::looper::Looper). Pushed payloads reach the right
//! watcher through the [`BridgesWatcher`] router; watchers with a status
//! endpoint also poll it whenever their wait runs out.

pub mod fetch;
pub mod router;
pub mod watcher;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use fetch::{HttpStatusFetcher, StatusFetcher};
pub use router::{BridgesWatcher, RouteOutcome};
pub use watcher::BridgeWatcher;

fn default_max_ttl() -> u64 {
    240
}

fn default_ttl_if_unreachable() -> u64 {
    60
}

fn default_alert_delay() -> u64 {
    300
}

fn default_alert_period() -> u64 {
    3600
}

/// Per-bridge polling and alerting knobs. All durations are seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Bridge state endpoint to poll. Without it the bridge can only be
    /// watched through pushed payloads.
    #[serde(default)]
    pub status_endpoint_url: Option<String>,
    /// Bearer credential for the status endpoint.
    #[serde(default)]
    pub auth_token: String,
    /// Upper bound for the wait between two checks.
    #[serde(default = "default_max_ttl")]
    pub max_ttl: u64,
    /// Upper bound for the wait after the endpoint could not be read.
    #[serde(default = "default_ttl_if_unreachable")]
    pub ttl_if_unreachable: u64,
    /// Grace period a bad streak must last before the first alert.
    #[serde(default = "default_alert_delay")]
    pub alert_delay: u64,
    /// Minimum spacing of repeated alerts within one bad streak.
    #[serde(default = "default_alert_period")]
    pub alert_period: u64,
}

impl BridgeSettings {
    /// [`Self::max_ttl`] as a duration.
    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl)
    }

    /// [`Self::ttl_if_unreachable`] as a duration.
    pub fn ttl_if_unreachable(&self) -> Duration {
        Duration::from_secs(self.ttl_if_unreachable)
    }

    /// [`Self::alert_delay`] as a duration.
    pub fn alert_delay(&self) -> Duration {
        Duration::from_secs(self.alert_delay)
    }

    /// [`Self::alert_period`] as a duration.
    pub fn alert_period(&self) -> Duration {
        Duration::from_secs(self.alert_period)
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            status_endpoint_url: None,
            auth_token: String::new(),
            max_ttl: default_max_ttl(),
            ttl_if_unreachable: default_ttl_if_unreachable(),
            alert_delay: default_alert_delay(),
            alert_period: default_alert_period(),
        }
    }
}

/// One watched account on a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeAccount {
    /// Bridge the account is watched on.
    pub bridge_id: String,
    /// Human label used in logs and notices.
    pub label: String,
    /// Account id the bridge serves.
    pub account_id: String,
    /// Remote network identity, when known up front.
    pub remote_id: Option<String>,
}

/// A bridge together with the accounts watched on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedBridge {
    /// Configured bridge id.
    pub bridge_id: String,
    /// Polling and alerting knobs shared by all accounts.
    pub settings: BridgeSettings,
    /// One watcher is started per account.
    pub accounts: Vec<BridgeAccount>,
}
