//! Status endpoint polling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use url::Url;

use crate::error::{Result, WatchError};
use crate::status::{RemoteStateResponse, StatusPayload};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads the current remote states of one account from a bridge.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Current remote states of `account_id`.
    async fn fetch(&self, account_id: &str) -> Result<RemoteStateResponse>;
}

/// Polls a bridge state endpoint over HTTP with a bearer credential.
#[derive(Debug, Clone)]
pub struct HttpStatusFetcher {
    client: reqwest::Client,
    endpoint: Url,
    auth_token: String,
}

impl HttpStatusFetcher {
    /// Poll `endpoint`, which must be an absolute URL.
    pub fn new(client: reqwest::Client, endpoint: &str, auth_token: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| WatchError::InvalidConfig(format!("status endpoint {endpoint}: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            auth_token: auth_token.into(),
        })
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch(&self, account_id: &str) -> Result<RemoteStateResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.auth_token)
            .query(&[("user_id", account_id)])
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .body("")
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::StatusEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Pick the entry of a poll response that belongs to the watcher.
///
/// With a known `remote_id` that entry is required. Without one, the
/// response must name exactly one remote.
pub fn select_remote_state(
    response: RemoteStateResponse,
    remote_id: Option<&str>,
) -> Result<StatusPayload> {
    let mut states = response.remote_state;
    match remote_id {
        Some(remote_id) => states
            .remove(remote_id)
            .ok_or_else(|| WatchError::MissingRemoteState(remote_id.to_owned())),
        None if states.len() > 1 => Err(WatchError::AmbiguousRemoteState(states.len())),
        None => states
            .into_values()
            .next()
            .ok_or(WatchError::EmptyRemoteState),
    }
}
