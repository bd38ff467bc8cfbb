//! Process wiring: clients, listeners, watchers and the push endpoint.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use bridgewatch_config::Config;
use bridgewatch_core::account::{AccountClient, AccountDirectory, AccountWatchers, HomeserverClient};
use bridgewatch_core::bridge::BridgesWatcher;
use bridgewatch_core::listeners::{
    ActivityListeners, BridgeListeners, RoomNotifier, StatusLogger,
};
use bridgewatch_core::{AccountActivityListener, BridgeStatusListener, PushReceiver};
use tracing::info;

use crate::push::{self, PushReceivers};

const USER_AGENT: &str = concat!("bridgewatch/", env!("CARGO_PKG_VERSION"));

pub fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")
}

/// One homeserver client per configured account.
pub fn build_directory(config: &Config, http: &reqwest::Client) -> anyhow::Result<AccountDirectory> {
    let mut clients: Vec<Arc<dyn AccountClient>> = Vec::with_capacity(config.accounts.len());
    for (account_id, account) in &config.accounts {
        let client = HomeserverClient::new(
            http.clone(),
            &account.homeserver,
            account_id.clone(),
            account.access_token.clone(),
        )
        .with_context(|| format!("account {account_id}"))?;
        clients.push(Arc::new(client));
    }
    Ok(AccountDirectory::new(clients))
}

#[derive(Clone)]
pub struct Listeners {
    pub bridge: BridgeListeners,
    pub activity: ActivityListeners,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("bridge", &self.bridge.len())
            .field("activity", &self.activity.len())
            .finish()
    }
}

/// The status logger, plus the room notifier when `notify.room` is set.
pub fn build_listeners(config: &Config, directory: &AccountDirectory) -> anyhow::Result<Listeners> {
    let logger = Arc::new(StatusLogger);
    let mut bridge: Vec<Arc<dyn BridgeStatusListener>> = vec![logger.clone()];
    let mut activity: Vec<Arc<dyn AccountActivityListener>> = vec![logger];

    if let Some(room) = &config.notify.room {
        let client = directory
            .get(&room.account_id)
            .with_context(|| format!("notify account {} is not configured", room.account_id))?;
        let notifier = Arc::new(RoomNotifier::new(client, room.room_id.clone()));
        info!(room = %room.room_id, account = %room.account_id, "Posting notices to room");
        bridge.push(notifier.clone());
        activity.push(notifier);
    }

    Ok(Listeners {
        bridge: Arc::from(bridge),
        activity: Arc::from(activity),
    })
}

/// Start every watcher, serve the push endpoint until `shutdown` resolves,
/// then stop all loops.
pub async fn run(config: Config, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    let http = http_client()?;
    let directory = build_directory(&config, &http)?;
    let listeners = build_listeners(&config, &directory)?;

    info!("Starting bridge watchers...");
    let bridges = Arc::new(
        BridgesWatcher::start(&config.watched_bridges(), http, listeners.bridge)
            .context("failed to start bridge watchers")?,
    );

    info!("Starting account watchers...");
    let accounts = AccountWatchers::start(&directory, config.account_watch_settings(), listeners.activity)
        .context("failed to start account watchers")?;

    info!(
        bridge_watchers = bridges.watchers().len(),
        account_watchers = accounts.accounts().len(),
        "Watchers started"
    );

    let receivers: PushReceivers = Arc::from(vec![
        Arc::new(StatusLogger) as Arc<dyn PushReceiver>,
        bridges.clone() as Arc<dyn PushReceiver>,
    ]);

    let addr = format!("{}:{}", config.listen.host, config.listen.port);
    let served = async {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!("Starting status listener on {}", addr);
        axum::serve(listener, push::router(receivers))
            .with_graceful_shutdown(shutdown)
            .await
            .context("push endpoint failed")
    }
    .await;

    info!("Stopping watchers");
    bridges.stop().await;
    accounts.stop().await;
    info!("Stopped");

    served
}
