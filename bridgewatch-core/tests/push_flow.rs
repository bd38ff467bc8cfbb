use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridgewatch_core::bridge::{BridgeAccount, BridgeSettings, BridgesWatcher, WatchedBridge};
use bridgewatch_core::listeners::BridgeListeners;
use bridgewatch_core::{BridgeStatusListener, BridgeUpdate, PushReceiver, StatusState};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct ChannelListener(mpsc::UnboundedSender<BridgeUpdate>);

#[async_trait]
impl BridgeStatusListener for ChannelListener {
    async fn bridge_update(&self, update: &BridgeUpdate) -> anyhow::Result<()> {
        self.0.send(update.clone())?;
        Ok(())
    }
}

fn listeners() -> (BridgeListeners, mpsc::UnboundedReceiver<BridgeUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Arc<dyn BridgeStatusListener> = Arc::new(ChannelListener(tx));
    (Arc::from(vec![listener]), rx)
}

fn account(label: &str, account_id: &str, remote_id: Option<&str>) -> BridgeAccount {
    BridgeAccount {
        bridge_id: "signal".into(),
        label: label.into(),
        account_id: account_id.into(),
        remote_id: remote_id.map(str::to_owned),
    }
}

fn bridge(settings: BridgeSettings, accounts: Vec<BridgeAccount>) -> WatchedBridge {
    WatchedBridge {
        bridge_id: "signal".into(),
        settings,
        accounts,
    }
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<BridgeUpdate>) -> BridgeUpdate {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("update within timeout")
        .expect("listener channel open")
}

#[tokio::test]
async fn pushed_status_reaches_the_owning_watcher() {
    let (listeners, mut rx) = listeners();
    let bridges = [bridge(
        BridgeSettings::default(),
        vec![
            account("work", "@alice:example.org", Some("+100")),
            account("home", "@bob:example.org", Some("+200")),
        ],
    )];
    let router = BridgesWatcher::start(&bridges, reqwest::Client::new(), listeners)
        .expect("watchers start");

    router
        .receive_push(
            br#"{"user_id":"@bob:example.org","remote_id":"+200","remote_name":"Bob","state_event":"BAD_CREDENTIALS","ttl":60}"#,
        )
        .await
        .expect("push accepted");

    let update = next_update(&mut rx).await;
    assert_eq!(update.account_label, "home");
    assert_eq!(update.state, StatusState::BadCredentials);
    assert!(update.is_bad);
    assert!(update.bad_since.is_some());
    assert!(!update.alert);

    let home = &router.watchers()[1];
    assert_eq!(home.identity().remote_name.as_deref(), Some("Bob"));

    router.stop().await;
}

#[tokio::test]
async fn unreadable_endpoint_reports_unreachable() {
    let (listeners, mut rx) = listeners();
    let settings = BridgeSettings {
        // Nothing listens on the discard port.
        status_endpoint_url: Some("http://127.0.0.1:9/".into()),
        ..BridgeSettings::default()
    };
    let bridges = [bridge(settings, vec![account("work", "@alice:example.org", None)])];
    let router = BridgesWatcher::start(&bridges, reqwest::Client::new(), listeners)
        .expect("watchers start");

    let update = next_update(&mut rx).await;
    assert_eq!(update.state, StatusState::Unreachable);
    assert!(update.is_bad);
    assert!(!router.watchers()[0].is_identifiable());

    router.stop().await;
}

#[tokio::test]
async fn pushes_for_unknown_remotes_change_nothing() {
    let (listeners, mut rx) = listeners();
    let bridges = [bridge(
        BridgeSettings::default(),
        vec![account("work", "@alice:example.org", Some("+100"))],
    )];
    let router = BridgesWatcher::start(&bridges, reqwest::Client::new(), listeners)
        .expect("watchers start");

    router
        .receive_push(br#"{"user_id":"@alice:example.org","remote_id":"+999","state_event":"LOGGED_OUT"}"#)
        .await
        .expect("push handled");
    router.receive_push(b"garbage").await.expect("push handled");

    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "no watcher should report"
    );

    router.stop().await;
}
