//! One watcher per (bridge, account) pair.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{Instrument, debug, error, info_span, warn};

use super::fetch::{StatusFetcher, select_remote_state};
use super::{BridgeAccount, BridgeSettings};
use crate::error::Result;
use crate::listeners::{BridgeListeners, BridgeUpdate, dispatch_bridge_update};
use crate::looper::{LoopTask, Looper};
use crate::status::{AlertHysteresis, StatusPayload, StatusState};

/// Remote identity learned from observations. Until `remote_id` is known
/// the watcher cannot claim pushed payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteIdentity {
    /// Id of the account on the remote network.
    pub remote_id: Option<String>,
    /// Display name on the remote network.
    pub remote_name: Option<String>,
}

/// Watches one account on one bridge.
#[derive(Debug)]
pub struct BridgeWatcher {
    account: BridgeAccount,
    identity: Arc<RwLock<RemoteIdentity>>,
    pending: Arc<Mutex<Option<StatusPayload>>>,
    looper: Looper,
}

impl BridgeWatcher {
    /// Build the watcher and start its loop on the current runtime.
    pub fn spawn(
        account: BridgeAccount,
        settings: BridgeSettings,
        fetcher: Option<Arc<dyn StatusFetcher>>,
        listeners: BridgeListeners,
    ) -> Self {
        if fetcher.is_none() {
            warn!(
                bridge = %account.bridge_id,
                account = %account.label,
                "No status endpoint configured - bridge crashes will not be detected"
            );
        }

        let identity = Arc::new(RwLock::new(RemoteIdentity {
            remote_id: account.remote_id.clone(),
            remote_name: None,
        }));
        let pending = Arc::new(Mutex::new(None));

        let task = BridgeStatusTask::new(
            account.clone(),
            settings,
            fetcher,
            listeners,
            Arc::clone(&identity),
            Arc::clone(&pending),
        );
        let looper = Looper::start(
            format!("BridgeWatcher_{}_{}", account.bridge_id, account.label),
            task,
        );

        Self {
            account,
            identity,
            pending,
            looper,
        }
    }

    /// Remote identity as currently known.
    pub fn identity(&self) -> RemoteIdentity {
        self.identity.read().clone()
    }

    /// Whether the remote id is known, either configured or learned.
    pub fn is_identifiable(&self) -> bool {
        self.identity.read().remote_id.is_some()
    }

    /// Whether a pushed payload belongs to this watcher: both account id and
    /// remote id must match exactly, and the remote id must already be known.
    pub fn accepts_data(&self, payload: &StatusPayload) -> bool {
        let identity = self.identity.read();
        match (&identity.remote_id, &payload.account_id) {
            (Some(remote_id), Some(account_id)) => {
                *account_id == self.account.account_id && *remote_id == payload.remote_id
            }
            _ => false,
        }
    }

    /// Store an accepted payload as the pending override and wake the loop.
    /// A newer payload replaces one that was not processed yet.
    pub fn receive_data(&self, payload: StatusPayload) -> bool {
        if !self.accepts_data(&payload) {
            return false;
        }
        *self.pending.lock() = Some(payload);
        self.looper.request_wake();
        true
    }

    /// Re-check as soon as possible without supplying data.
    pub fn request_refresh(&self) {
        self.looper.request_wake();
    }

    /// Stop the loop after its current iteration.
    pub async fn stop(&self) {
        self.looper.stop().await;
    }
}

/// Loop body of a [`BridgeWatcher`]. Owns the reconciliation state; only the
/// watcher's own loop touches it.
pub(crate) struct BridgeStatusTask {
    account: BridgeAccount,
    settings: BridgeSettings,
    fetcher: Option<Arc<dyn StatusFetcher>>,
    listeners: BridgeListeners,
    identity: Arc<RwLock<RemoteIdentity>>,
    pending: Arc<Mutex<Option<StatusPayload>>>,
    state: Option<StatusState>,
    reported_state: Option<StatusState>,
    hysteresis: AlertHysteresis,
}

impl BridgeStatusTask {
    pub(crate) fn new(
        account: BridgeAccount,
        settings: BridgeSettings,
        fetcher: Option<Arc<dyn StatusFetcher>>,
        listeners: BridgeListeners,
        identity: Arc<RwLock<RemoteIdentity>>,
        pending: Arc<Mutex<Option<StatusPayload>>>,
    ) -> Self {
        let hysteresis = AlertHysteresis::new(settings.alert_delay(), settings.alert_period());
        Self {
            account,
            settings,
            fetcher,
            listeners,
            identity,
            pending,
            state: None,
            reported_state: None,
            hysteresis,
        }
    }

    async fn poll(&mut self, fetcher: &dyn StatusFetcher) -> Result<Duration> {
        let response = fetcher.fetch(&self.account.account_id).await?;
        let remote_id = self.identity.read().remote_id.clone();
        let payload = select_remote_state(response, remote_id.as_deref())?;
        Ok(self.reconcile(&payload, Utc::now()).await)
    }

    /// Apply one observation and return the wait until the next check.
    pub(crate) async fn reconcile(&mut self, payload: &StatusPayload, now: DateTime<Utc>) -> Duration {
        self.adopt_identity(payload);
        self.state = Some(payload.state_event);

        let next_alert_wait = self.evaluate(payload.state_event, now).await;
        let wait = self.settings.max_ttl().min(next_alert_wait);
        match payload.ttl {
            Some(ttl) => wait.min(Duration::from_secs(ttl)),
            None => wait,
        }
    }

    /// The status endpoint could not be read: treat the bridge as
    /// unreachable and come back sooner.
    pub(crate) async fn demote_unreachable(&mut self, now: DateTime<Utc>) -> Duration {
        self.state = Some(StatusState::Unreachable);
        let next_alert_wait = self.evaluate(StatusState::Unreachable, now).await;
        self.settings
            .max_ttl()
            .min(next_alert_wait)
            .min(self.settings.ttl_if_unreachable())
    }

    fn adopt_identity(&self, payload: &StatusPayload) {
        let mut identity = self.identity.write();

        let previous_id = identity.remote_id.replace(payload.remote_id.clone());
        if let Some(previous) = previous_id
            && previous != payload.remote_id
        {
            warn!(
                bridge = %self.account.bridge_id,
                account = %self.account.label,
                "remote_id mismatch ({}, {})! did the account log in to a different remote?",
                previous,
                payload.remote_id
            );
        }

        if let Some(remote_name) = &payload.remote_name {
            let previous_name = identity.remote_name.replace(remote_name.clone());
            if let Some(previous) = previous_name
                && previous != *remote_name
            {
                warn!(
                    bridge = %self.account.bridge_id,
                    account = %self.account.label,
                    "remote_name mismatch ({}, {})! did the account log in to a different remote?",
                    previous,
                    remote_name
                );
            }
        }
    }

    async fn evaluate(&mut self, state: StatusState, now: DateTime<Utc>) -> Duration {
        let decision = self
            .hysteresis
            .evaluate(state.is_bad(), now, self.settings.max_ttl());

        let update = BridgeUpdate {
            bridge_id: self.account.bridge_id.clone(),
            account_label: self.account.label.clone(),
            account_id: self.account.account_id.clone(),
            state,
            previous_state: self.reported_state,
            is_good: state.is_good(),
            is_bad: state.is_bad(),
            bad_since: decision.bad_since,
            alert: decision.alert,
        };
        dispatch_bridge_update(&self.listeners, &update).await;
        self.reported_state = Some(state);

        decision.next_wait
    }

    #[cfg(test)]
    pub(crate) fn bad_since(&self) -> Option<DateTime<Utc>> {
        self.hysteresis.bad_since()
    }
}

#[async_trait]
impl LoopTask for BridgeStatusTask {
    async fn run_once(&mut self) -> Result<Duration> {
        let span = info_span!(
            "bridge_watcher",
            bridge = %self.account.bridge_id,
            account = %self.account.label
        );

        async {
            let pending = self.pending.lock().take();
            if let Some(payload) = pending {
                debug!("Handling pushed status {}", payload.state_event);
                return Ok(self.reconcile(&payload, Utc::now()).await);
            }

            let Some(fetcher) = self.fetcher.clone() else {
                return Ok(self.settings.max_ttl());
            };

            match self.poll(fetcher.as_ref()).await {
                Ok(wait) => Ok(wait),
                Err(e) => {
                    error!("Reading status failed: {}", e);
                    Ok(self.demote_unreachable(Utc::now()).await)
                }
            }
        }
        .instrument(span)
        .await
    }
}
