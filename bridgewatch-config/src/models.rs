//! Serde model of the configuration file.

use std::collections::BTreeMap;

use bridgewatch_core::account::AccountWatchSettings;
use bridgewatch_core::bridge::{BridgeAccount, BridgeSettings, WatchedBridge};
use serde::{Deserialize, Serialize};

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

/// Address of the push receiver endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Bind address, `127.0.0.1` by default.
    #[serde(default = "default_listen_host")]
    pub host: String,
    /// Bind port, `8080` by default.
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
        }
    }
}

/// An account watched on a bridge, keyed by its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeAccountConfig {
    /// Account id the bridge serves.
    pub account_id: String,
    /// Known remote identity. Learned from the first poll when absent.
    #[serde(default)]
    pub remote_id: Option<String>,
}

/// A bridge: its polling and alerting settings and its watched accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Status endpoint, credential and timing knobs.
    #[serde(flatten)]
    pub settings: BridgeSettings,
    /// Watched accounts keyed by label.
    #[serde(default)]
    pub accounts: BTreeMap<String, BridgeAccountConfig>,
}

/// Homeserver login of an account plus what its sync loop watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Homeserver base URL.
    pub homeserver: String,
    /// Access token of the account's session.
    pub access_token: String,
    /// Read marker and inactivity settings.
    #[serde(flatten)]
    pub watch: AccountWatchSettings,
}

/// Room that receives one-line notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomNotifyConfig {
    /// Configured account that posts the notices.
    pub account_id: String,
    /// Target room id.
    pub room_id: String,
}

/// Where alerts go besides the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Post notices into a room.
    #[serde(default)]
    pub room: Option<RoomNotifyConfig>,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Push endpoint address.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Bridges keyed by bridge id.
    #[serde(default)]
    pub bridges: BTreeMap<String, BridgeConfig>,
    /// Accounts keyed by account id.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    /// Notification targets.
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    /// Bridges with their watched accounts, ready for the bridge router.
    pub fn watched_bridges(&self) -> Vec<WatchedBridge> {
        self.bridges
            .iter()
            .map(|(bridge_id, bridge)| WatchedBridge {
                bridge_id: bridge_id.clone(),
                settings: bridge.settings.clone(),
                accounts: bridge
                    .accounts
                    .iter()
                    .map(|(label, account)| BridgeAccount {
                        bridge_id: bridge_id.clone(),
                        label: label.clone(),
                        account_id: account.account_id.clone(),
                        remote_id: account.remote_id.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Sync loop settings per account id.
    pub fn account_watch_settings(&self) -> Vec<(String, AccountWatchSettings)> {
        self.accounts
            .iter()
            .map(|(account_id, account)| (account_id.clone(), account.watch.clone()))
            .collect()
    }

    /// Number of bridge watchers the configuration starts.
    pub fn bridge_account_count(&self) -> usize {
        self.bridges.values().map(|bridge| bridge.accounts.len()).sum()
    }
}
