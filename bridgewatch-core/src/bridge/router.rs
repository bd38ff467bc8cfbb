//! Routing of pushed payloads to the owning watcher.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::fetch::{HttpStatusFetcher, StatusFetcher};
use super::watcher::BridgeWatcher;
use super::WatchedBridge;
use crate::error::Result;
use crate::listeners::{BridgeListeners, PushReceiver};
use crate::status::StatusPayload;

/// What happened to a pushed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No watcher claimed it.
    Ignored,
    /// Exactly one watcher received it.
    Delivered,
    /// Several watchers claimed it; all of them were asked to refresh.
    Ambiguous(usize),
}

/// Owns every [`BridgeWatcher`] and routes pushed payloads to them.
/// The set of watchers never changes after construction.
#[derive(Debug)]
pub struct BridgesWatcher {
    watchers: Vec<BridgeWatcher>,
}

impl BridgesWatcher {
    /// Wrap already running watchers.
    pub fn new(watchers: Vec<BridgeWatcher>) -> Self {
        Self { watchers }
    }

    /// Start one watcher per configured bridge account.
    pub fn start(
        bridges: &[WatchedBridge],
        http: reqwest::Client,
        listeners: BridgeListeners,
    ) -> Result<Self> {
        let mut watchers = Vec::new();

        for bridge in bridges {
            let fetcher: Option<Arc<dyn StatusFetcher>> =
                match &bridge.settings.status_endpoint_url {
                    Some(url) => Some(Arc::new(HttpStatusFetcher::new(
                        http.clone(),
                        url,
                        bridge.settings.auth_token.clone(),
                    )?)),
                    None => None,
                };

            for account in &bridge.accounts {
                info!(bridge = %bridge.bridge_id, account = %account.label, "Starting bridge watcher");
                watchers.push(BridgeWatcher::spawn(
                    account.clone(),
                    bridge.settings.clone(),
                    fetcher.clone(),
                    Arc::clone(&listeners),
                ));
            }
        }

        Ok(Self::new(watchers))
    }

    /// Every watcher, in configuration order.
    pub fn watchers(&self) -> &[BridgeWatcher] {
        &self.watchers
    }

    /// Hand a payload to the single watcher that claims it.
    pub fn route(&self, payload: StatusPayload) -> RouteOutcome {
        let accepters: Vec<&BridgeWatcher> = self
            .watchers
            .iter()
            .filter(|watcher| watcher.accepts_data(&payload))
            .collect();

        match accepters.as_slice() {
            [] => {
                debug!(remote_id = %payload.remote_id, "No watcher accepts pushed status");
                RouteOutcome::Ignored
            }
            [watcher] => {
                watcher.receive_data(payload);
                RouteOutcome::Delivered
            }
            many => {
                error!(
                    remote_id = %payload.remote_id,
                    watchers = many.len(),
                    "Discarding ambiguous update {:?}",
                    payload
                );
                for watcher in many {
                    watcher.request_refresh();
                }
                RouteOutcome::Ambiguous(many.len())
            }
        }
    }

    /// Stop every watcher loop.
    pub async fn stop(&self) {
        for watcher in &self.watchers {
            watcher.stop().await;
        }
    }
}

#[async_trait]
impl PushReceiver for BridgesWatcher {
    async fn receive_push(&self, body: &[u8]) -> anyhow::Result<()> {
        match StatusPayload::parse(body) {
            Ok(payload) => {
                self.route(payload);
            }
            Err(e) => warn!("Ignoring malformed status push: {}", e),
        }
        Ok(())
    }
}
