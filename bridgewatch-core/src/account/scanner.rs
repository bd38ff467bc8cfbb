//! Account loop: sync, attribute rooms to bridges, backfill, evaluate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::AccountWatchSettings;
use super::client::{AccountClient, JoinedRoom, TimelineEvent};
use super::directory::AccountDirectory;
use super::state::{ProbeRequest, UserBridgeState};
use crate::error::{Result, WatchError};
use crate::listeners::{ActivityListeners, AccountActivityUpdate, dispatch_activity_update};
use crate::looper::{LoopTask, Looper};

/// Long-poll timeout of one sync request.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between two syncs.
pub const SYNC_DELAY: Duration = Duration::from_secs(5);

/// Feed `events` to `state` until they stop being informative.
///
/// Returns `true` once a bridged message was found, an event older than the
/// inactivity cutoff was reached, or an event older than the newest known
/// message was reached. `false` means more history is needed.
pub(crate) fn scan_events<'a>(
    state: &mut UserBridgeState,
    events: impl IntoIterator<Item = &'a TimelineEvent>,
    own_account_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let cutoff = state.oldest_interesting_ts(now);
    for event in events {
        if state.observe(event, own_account_id) {
            return true;
        }
        if event.origin_server_ts < cutoff {
            return true;
        }
        if state
            .last_bridged_message_ts()
            .is_some_and(|newest| event.origin_server_ts < newest)
        {
            return true;
        }
    }
    false
}

/// Loop body of a [`WatchedAccount`].
pub(crate) struct AccountScanTask {
    client: Arc<dyn AccountClient>,
    settings: AccountWatchSettings,
    bridges: Vec<UserBridgeState>,
    directory: AccountDirectory,
    listeners: ActivityListeners,
    next_batch: Option<String>,
}

impl AccountScanTask {
    pub(crate) fn new(
        client: Arc<dyn AccountClient>,
        settings: AccountWatchSettings,
        directory: AccountDirectory,
        listeners: ActivityListeners,
    ) -> Self {
        let bridges = settings
            .watched_bridges
            .iter()
            .map(|(bridge_id, inactivity)| UserBridgeState::new(bridge_id.clone(), inactivity.clone()))
            .collect();
        Self {
            client,
            settings,
            bridges,
            directory,
            listeners,
            next_batch: None,
        }
    }

    async fn check_rooms(&mut self) -> Result<()> {
        if self.next_batch.is_some() {
            debug!("Incremental sync");
        } else {
            debug!("Initial sync");
        }

        let snapshot = match self.client.sync(self.next_batch.as_deref(), SYNC_TIMEOUT).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Sync failed: {}", e);
                self.report_account_problem(format!("Sync failed: {e}")).await;
                return Ok(());
            }
        };

        debug!("Handle {} rooms", snapshot.joined.len());
        for room in &snapshot.joined {
            self.scan_room(room).await?;
        }
        debug!("Done handling {} rooms", snapshot.joined.len());

        let now = Utc::now();
        let account_id = self.client.account_id().to_owned();
        let evaluations: Vec<_> = self
            .bridges
            .iter_mut()
            .filter_map(|bridge| bridge.evaluate(now, &account_id))
            .collect();

        for evaluation in evaluations {
            if let Some(probe) = &evaluation.probe {
                self.send_probe(probe).await;
            }
            debug!(
                bridge = ?evaluation.update.bridge_id,
                is_good = evaluation.update.is_good,
                alert = evaluation.update.alert,
                "Update listeners"
            );
            dispatch_activity_update(&self.listeners, &evaluation.update).await;
        }

        self.next_batch = Some(snapshot.next_batch);
        Ok(())
    }

    async fn scan_room(&mut self, room: &JoinedRoom) -> Result<()> {
        // Set when the room wants a read marker update but this sync carried
        // no event to put it on. The first backfill page supplies one.
        let mut needs_mark_as_read = false;
        if self.wants_mark_as_read(room) {
            match room.timeline.last() {
                Some(latest) => self.mark_read(&room.room_id, &latest.event_id).await,
                None => needs_mark_as_read = true,
            }
        }

        let own_account_id = self.client.account_id().to_owned();
        for index in self.resolve_bridges(&room.room_id).await? {
            let mut found = scan_events(
                &mut self.bridges[index],
                room.timeline.iter().rev(),
                &own_account_id,
                Utc::now(),
            );

            let mut token = room.prev_batch.clone();
            while !found {
                debug!(
                    "Backfill {} ({}) - {:?}",
                    room.room_id,
                    self.bridges[index].bridge_id(),
                    token
                );
                let page = match self
                    .client
                    .room_messages_backward(&room.room_id, token.as_deref())
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        warn!("Backfill of {} aborted: {}", room.room_id, e);
                        break;
                    }
                };

                if needs_mark_as_read && let Some(newest) = page.chunk.first() {
                    needs_mark_as_read = false;
                    self.mark_read(&room.room_id, &newest.event_id).await;
                }

                if page.end.is_none() || page.end == token {
                    found = true;
                }
                if scan_events(
                    &mut self.bridges[index],
                    &page.chunk,
                    &own_account_id,
                    Utc::now(),
                ) {
                    found = true;
                }
                token = page.end;
            }
            debug!(
                "Done checking {} ({})",
                room.room_id,
                self.bridges[index].bridge_id()
            );
        }
        Ok(())
    }

    fn wants_mark_as_read(&self, room: &JoinedRoom) -> bool {
        if self.settings.auto_mark_read_rooms.contains(&room.room_id) {
            return true;
        }
        self.settings
            .auto_mark_read_rooms_without_notification
            .contains(&room.room_id)
            && room.unread.is_empty()
    }

    async fn mark_read(&self, room_id: &str, event_id: &str) {
        debug!("Update read marker for {} to {}", room_id, event_id);
        if let Err(e) = self.client.set_read_markers(room_id, event_id).await {
            error!("Failed to update read marker for {}: {}", room_id, e);
        }
    }

    /// Indices of the bridge states a room belongs to.
    async fn resolve_bridges(&self, room_id: &str) -> Result<Vec<usize>> {
        let explicit: Vec<usize> = self
            .bridges
            .iter()
            .enumerate()
            .filter(|(_, bridge)| bridge.claims_room(room_id))
            .map(|(index, _)| index)
            .collect();
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let bridge_ids = self.client.room_bridge_ids(room_id).await?;
        match bridge_ids.as_slice() {
            [] => Ok(Vec::new()),
            [bridge_id] => Ok(self
                .bridges
                .iter()
                .position(|bridge| bridge.bridge_id() == bridge_id)
                .into_iter()
                .collect()),
            many => {
                debug!("Skip {}: no unique bridge: {:?}", room_id, many);
                Ok(Vec::new())
            }
        }
    }

    async fn send_probe(&self, probe: &ProbeRequest) {
        debug!("Send activity as user {}", probe.sender);
        match self
            .directory
            .send_as(&probe.sender, &probe.room_id, &probe.text)
            .await
        {
            Ok(()) => debug!("Sent activity as user {}", probe.sender),
            Err(e) => error!("Inactivity send failed: {}", e),
        }
    }

    async fn report_account_problem(&self, info: String) {
        let update = AccountActivityUpdate {
            account_id: self.client.account_id().to_owned(),
            bridge_id: None,
            is_good: false,
            alert: true,
            info: Some(info),
        };
        dispatch_activity_update(&self.listeners, &update).await;
    }
}

#[async_trait]
impl LoopTask for AccountScanTask {
    async fn run_once(&mut self) -> Result<Duration> {
        let span = info_span!("account_watch", account = %self.client.account_id());
        async {
            if let Err(e) = self.check_rooms().await {
                error!("Error in update loop: {}", e);
                self.report_account_problem("Internal error".to_owned()).await;
            }
        }
        .instrument(span)
        .await;
        Ok(SYNC_DELAY)
    }
}

/// Sync loop of one account.
#[derive(Debug)]
pub struct WatchedAccount {
    looper: Looper,
}

impl WatchedAccount {
    /// Start syncing `client`'s account on the current runtime.
    pub fn spawn(
        client: Arc<dyn AccountClient>,
        settings: AccountWatchSettings,
        directory: AccountDirectory,
        listeners: ActivityListeners,
    ) -> Self {
        let name = format!("UserWatch_{}", client.account_id());
        let task = AccountScanTask::new(client, settings, directory, listeners);
        Self {
            looper: Looper::start(name, task),
        }
    }

    /// Stop the loop after its current sync.
    pub async fn stop(&self) {
        self.looper.stop().await;
    }
}

/// Every account loop of the process.
#[derive(Debug, Default)]
pub struct AccountWatchers {
    accounts: Vec<WatchedAccount>,
}

impl AccountWatchers {
    /// Start one loop per account. Accounts without a settings entry are
    /// only available for sending through the directory.
    pub fn start(
        directory: &AccountDirectory,
        settings: impl IntoIterator<Item = (String, AccountWatchSettings)>,
        listeners: ActivityListeners,
    ) -> Result<Self> {
        let mut accounts = Vec::new();
        for (account_id, account_settings) in settings {
            let client = directory
                .get(&account_id)
                .ok_or_else(|| WatchError::UnknownAccount(account_id.clone()))?;
            info!(
                account = %account_id,
                bridges = account_settings.watched_bridges.len(),
                "Starting account watcher"
            );
            accounts.push(WatchedAccount::spawn(
                client,
                account_settings,
                directory.clone(),
                Arc::clone(&listeners),
            ));
        }
        Ok(Self { accounts })
    }

    /// Running account loops, in start order.
    pub fn accounts(&self) -> &[WatchedAccount] {
        &self.accounts
    }

    /// Stop every account loop.
    pub async fn stop(&self) {
        for account in &self.accounts {
            account.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};

    use chrono::TimeDelta;
    use parking_lot::Mutex;

    use super::*;
    use crate::account::client::{
        ClientError, EventKind, MessageKind, MessagesPage, SyncSnapshot, UnreadCounts,
    };
    use crate::account::state::{InactivitySettings, LivenessProbeSettings};
    use crate::listeners::AccountActivityListener;

    const ME: &str = "@me:example.org";
    const BOT: &str = "@signalbot:example.org";
    const ROOM: &str = "!portal:example.org";

    #[derive(Default)]
    struct FakeClient {
        account_id: String,
        syncs: Mutex<VecDeque<std::result::Result<SyncSnapshot, ClientError>>>,
        sync_tokens: Mutex<Vec<Option<String>>>,
        room_bridges: BTreeMap<String, Vec<String>>,
        pages: Mutex<VecDeque<MessagesPage>>,
        page_requests: Mutex<Vec<Option<String>>>,
        read_markers: Mutex<Vec<(String, String)>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeClient {
        fn new(account_id: &str) -> Self {
            Self {
                account_id: account_id.into(),
                ..Default::default()
            }
        }

        fn with_bridge(mut self, room_id: &str, bridge_ids: &[&str]) -> Self {
            self.room_bridges.insert(
                room_id.into(),
                bridge_ids.iter().map(|id| (*id).to_owned()).collect(),
            );
            self
        }

        fn push_sync(&self, sync: std::result::Result<SyncSnapshot, ClientError>) {
            self.syncs.lock().push_back(sync);
        }

        fn push_page(&self, page: MessagesPage) {
            self.pages.lock().push_back(page);
        }
    }

    #[async_trait]
    impl AccountClient for FakeClient {
        fn account_id(&self) -> &str {
            &self.account_id
        }

        async fn sync(
            &self,
            since: Option<&str>,
            _timeout: Duration,
        ) -> std::result::Result<SyncSnapshot, ClientError> {
            self.sync_tokens.lock().push(since.map(str::to_owned));
            self.syncs.lock().pop_front().unwrap_or_else(|| {
                Ok(SyncSnapshot {
                    next_batch: "idle".into(),
                    joined: Vec::new(),
                })
            })
        }

        async fn room_bridge_ids(&self, room_id: &str) -> std::result::Result<Vec<String>, ClientError> {
            Ok(self.room_bridges.get(room_id).cloned().unwrap_or_default())
        }

        async fn room_messages_backward(
            &self,
            _room_id: &str,
            from: Option<&str>,
        ) -> std::result::Result<MessagesPage, ClientError> {
            self.page_requests.lock().push(from.map(str::to_owned));
            Ok(self.pages.lock().pop_front().unwrap_or(MessagesPage {
                chunk: Vec::new(),
                end: None,
            }))
        }

        async fn set_read_markers(
            &self,
            room_id: &str,
            event_id: &str,
        ) -> std::result::Result<(), ClientError> {
            self.read_markers.lock().push((room_id.into(), event_id.into()));
            Ok(())
        }

        async fn send_message(
            &self,
            room_id: &str,
            _kind: MessageKind,
            body: &str,
        ) -> std::result::Result<(), ClientError> {
            self.sent.lock().push((room_id.into(), body.into()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<AccountActivityUpdate>>,
    }

    #[async_trait]
    impl AccountActivityListener for Recorder {
        async fn account_activity_update(&self, update: &AccountActivityUpdate) -> anyhow::Result<()> {
            self.updates.lock().push(update.clone());
            Ok(())
        }
    }

    fn inactivity() -> InactivitySettings {
        InactivitySettings {
            alert_after_inactivity: 600,
            alert_period: 3600,
            explicit_rooms: Vec::new(),
            required_sender: None,
            liveness_probe: None,
        }
    }

    fn watching(bridge: &str, settings: InactivitySettings) -> AccountWatchSettings {
        AccountWatchSettings {
            watched_bridges: BTreeMap::from([(bridge.to_owned(), settings)]),
            ..Default::default()
        }
    }

    fn secs_ago(secs: i64) -> i64 {
        (Utc::now() - TimeDelta::seconds(secs)).timestamp_millis()
    }

    fn event(id: &str, sender: &str, kind: EventKind, ts: i64) -> TimelineEvent {
        TimelineEvent {
            event_id: id.into(),
            sender: sender.into(),
            kind,
            origin_server_ts: ts,
        }
    }

    fn room(timeline: Vec<TimelineEvent>, prev_batch: Option<&str>) -> JoinedRoom {
        JoinedRoom {
            room_id: ROOM.into(),
            timeline,
            prev_batch: prev_batch.map(str::to_owned),
            unread: UnreadCounts::default(),
        }
    }

    fn snapshot(next_batch: &str, rooms: Vec<JoinedRoom>) -> SyncSnapshot {
        SyncSnapshot {
            next_batch: next_batch.into(),
            joined: rooms,
        }
    }

    fn task(
        client: &Arc<FakeClient>,
        settings: AccountWatchSettings,
        recorder: &Arc<Recorder>,
    ) -> AccountScanTask {
        let as_client: Arc<dyn AccountClient> = client.clone();
        let listener: Arc<dyn AccountActivityListener> = recorder.clone();
        AccountScanTask::new(
            Arc::clone(&as_client),
            settings,
            AccountDirectory::new([as_client]),
            Arc::from(vec![listener]),
        )
    }

    #[tokio::test]
    async fn live_timeline_message_reports_good() {
        let client = Arc::new(FakeClient::new(ME).with_bridge(ROOM, &["signal"]));
        client.push_sync(Ok(snapshot(
            "s1",
            vec![room(
                vec![
                    event("$old", BOT, EventKind::Message, secs_ago(30)),
                    event("$mine", ME, EventKind::Message, secs_ago(10)),
                ],
                Some("p1"),
            )],
        )));
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", inactivity()), &recorder);

        assert_eq!(task.run_once().await.expect("iteration"), SYNC_DELAY);

        let updates = recorder.updates.lock().clone();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_good);
        assert_eq!(updates[0].bridge_id.as_deref(), Some("signal"));
        assert!(client.page_requests.lock().is_empty());

        task.run_once().await.expect("iteration");
        assert_eq!(
            *client.sync_tokens.lock(),
            vec![None, Some("s1".to_owned())]
        );
    }

    #[tokio::test]
    async fn backfills_until_a_bridged_message_is_found() {
        let client = Arc::new(FakeClient::new(ME).with_bridge(ROOM, &["signal"]));
        client.push_sync(Ok(snapshot(
            "s1",
            vec![room(vec![event("$mine", ME, EventKind::Message, secs_ago(5))], Some("p1"))],
        )));
        client.push_page(MessagesPage {
            chunk: vec![event("$state", BOT, EventKind::Other, secs_ago(60))],
            end: Some("p2".into()),
        });
        client.push_page(MessagesPage {
            chunk: vec![event("$msg", BOT, EventKind::Encrypted, secs_ago(120))],
            end: Some("p3".into()),
        });
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", inactivity()), &recorder);

        task.run_once().await.expect("iteration");

        assert_eq!(
            *client.page_requests.lock(),
            vec![Some("p1".to_owned()), Some("p2".to_owned())]
        );
        assert!(recorder.updates.lock()[0].is_good);
    }

    #[tokio::test]
    async fn backfill_stops_at_the_inactivity_cutoff() {
        let client = Arc::new(FakeClient::new(ME).with_bridge(ROOM, &["signal"]));
        client.push_sync(Ok(snapshot("s1", vec![room(Vec::new(), Some("p1"))])));
        client.push_page(MessagesPage {
            chunk: vec![event("$ancient", ME, EventKind::Message, secs_ago(7200))],
            end: Some("p2".into()),
        });
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", inactivity()), &recorder);

        task.run_once().await.expect("iteration");

        assert_eq!(client.page_requests.lock().len(), 1);
        let update = recorder.updates.lock()[0].clone();
        assert!(!update.is_good);
        assert!(update.alert);
        assert_eq!(update.info.as_deref(), Some("No recent message found"));
    }

    #[tokio::test]
    async fn sync_failure_is_reported_and_token_kept() {
        let client = Arc::new(FakeClient::new(ME));
        client.push_sync(Ok(snapshot("s1", Vec::new())));
        client.push_sync(Err(ClientError::Status {
            status: 502,
            body: "bad gateway".into(),
        }));
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, AccountWatchSettings::default(), &recorder);

        task.run_once().await.expect("iteration");
        task.run_once().await.expect("iteration");
        task.run_once().await.expect("iteration");

        let updates = recorder.updates.lock().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].bridge_id, None);
        assert!(updates[0].alert);
        assert_eq!(
            updates[0].info.as_deref(),
            Some("Sync failed: homeserver returned 502: bad gateway")
        );
        assert_eq!(
            *client.sync_tokens.lock(),
            vec![None, Some("s1".to_owned()), Some("s1".to_owned())]
        );
    }

    #[tokio::test]
    async fn rooms_with_several_bridges_are_skipped() {
        let client = Arc::new(FakeClient::new(ME).with_bridge(ROOM, &["signal", "whatsapp"]));
        client.push_sync(Ok(snapshot(
            "s1",
            vec![room(vec![event("$msg", BOT, EventKind::Message, secs_ago(5))], None)],
        )));
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", inactivity()), &recorder);

        task.run_once().await.expect("iteration");

        assert!(!recorder.updates.lock()[0].is_good);
    }

    #[tokio::test]
    async fn explicit_rooms_override_bridge_state() {
        let client = Arc::new(FakeClient::new(ME));
        client.push_sync(Ok(snapshot(
            "s1",
            vec![room(vec![event("$msg", BOT, EventKind::Message, secs_ago(5))], None)],
        )));
        let mut settings = inactivity();
        settings.explicit_rooms = vec![ROOM.into()];
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", settings), &recorder);

        task.run_once().await.expect("iteration");

        assert!(recorder.updates.lock()[0].is_good);
    }

    #[tokio::test]
    async fn read_marker_is_deferred_to_backfill() {
        let client = Arc::new(FakeClient::new(ME).with_bridge(ROOM, &["signal"]));
        client.push_sync(Ok(snapshot("s1", vec![room(Vec::new(), Some("p1"))])));
        client.push_page(MessagesPage {
            chunk: vec![event("$newest", BOT, EventKind::Message, secs_ago(5))],
            end: Some("p2".into()),
        });
        let settings = AccountWatchSettings {
            auto_mark_read_rooms: vec![ROOM.into()],
            ..watching("signal", inactivity())
        };
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, settings, &recorder);

        task.run_once().await.expect("iteration");

        assert_eq!(
            *client.read_markers.lock(),
            vec![(ROOM.to_owned(), "$newest".to_owned())]
        );
    }

    #[tokio::test]
    async fn read_marker_skipped_while_notifications_are_pending() {
        let client = Arc::new(FakeClient::new(ME));
        let mut noisy = room(vec![event("$msg", BOT, EventKind::Message, secs_ago(5))], None);
        noisy.unread.highlight_count = 1;
        client.push_sync(Ok(snapshot("s1", vec![noisy])));
        let settings = AccountWatchSettings {
            auto_mark_read_rooms_without_notification: vec![ROOM.into()],
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, settings, &recorder);

        task.run_once().await.expect("iteration");

        assert!(client.read_markers.lock().is_empty());
    }

    #[tokio::test]
    async fn liveness_probe_is_sent_before_alerting() {
        let client = Arc::new(FakeClient::new(ME));
        let mut settings = inactivity();
        settings.liveness_probe = Some(LivenessProbeSettings {
            delay_alert: 300,
            send_user: ME.into(),
            send_room: "!probe:example.org".into(),
            send_text: "ping".into(),
        });
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", settings), &recorder);

        task.run_once().await.expect("iteration");

        assert_eq!(
            *client.sent.lock(),
            vec![("!probe:example.org".to_owned(), "ping".to_owned())]
        );
        let update = recorder.updates.lock()[0].clone();
        assert!(!update.is_good);
        assert!(!update.alert);
    }

    #[tokio::test]
    async fn backfill_stops_when_the_page_token_repeats() {
        let client = Arc::new(FakeClient::new(ME).with_bridge(ROOM, &["signal"]));
        client.push_sync(Ok(snapshot("s1", vec![room(Vec::new(), Some("p1"))])));
        client.push_page(MessagesPage {
            chunk: vec![event("$mine", ME, EventKind::Message, secs_ago(30))],
            end: Some("p1".into()),
        });
        client.push_page(MessagesPage {
            chunk: vec![event("$msg", BOT, EventKind::Message, secs_ago(60))],
            end: Some("p2".into()),
        });
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", inactivity()), &recorder);

        task.run_once().await.expect("iteration");

        assert_eq!(*client.page_requests.lock(), vec![Some("p1".to_owned())]);
        let update = recorder.updates.lock()[0].clone();
        assert!(!update.is_good);
        assert_eq!(update.info.as_deref(), Some("No recent message found"));
    }

    #[tokio::test]
    async fn unknown_sender_still_counts_as_sent() {
        let client = Arc::new(FakeClient::new(ME));
        let mut settings = inactivity();
        settings.liveness_probe = Some(LivenessProbeSettings {
            delay_alert: 300,
            send_user: "@ghost:example.org".into(),
            send_room: "!probe:example.org".into(),
            send_text: "ping".into(),
        });
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, watching("signal", settings), &recorder);

        task.run_once().await.expect("iteration");
        task.run_once().await.expect("iteration");

        assert!(client.sent.lock().is_empty());
        let updates = recorder.updates.lock().clone();
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].is_good);
        assert!(!updates[0].alert);
    }

    #[tokio::test]
    async fn read_marker_follows_the_live_timeline() {
        let client = Arc::new(FakeClient::new(ME));
        client.push_sync(Ok(snapshot(
            "s1",
            vec![room(
                vec![
                    event("$first", BOT, EventKind::Message, secs_ago(20)),
                    event("$last", BOT, EventKind::Other, secs_ago(10)),
                ],
                Some("p1"),
            )],
        )));
        let settings = AccountWatchSettings {
            auto_mark_read_rooms: vec![ROOM.into()],
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::default());
        let mut task = task(&client, settings, &recorder);

        task.run_once().await.expect("iteration");

        assert_eq!(
            *client.read_markers.lock(),
            vec![(ROOM.to_owned(), "$last".to_owned())]
        );
        assert!(client.page_requests.lock().is_empty());
    }

    #[test]
    fn scan_stops_at_events_older_than_known_message() {
        let mut state = UserBridgeState::new("signal", inactivity());
        let now = Utc::now();
        state.observe(&event("$known", BOT, EventKind::Message, secs_ago(60)), ME);

        let older_own = [event("$own", ME, EventKind::Message, secs_ago(90))];
        assert!(scan_events(&mut state, &older_own, ME, now));

        let newer_own = [event("$own", ME, EventKind::Message, secs_ago(10))];
        assert!(!scan_events(&mut state, &newer_own, ME, now));
    }
}
