//! Lookup of configured accounts by id.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::client::{AccountClient, MessageKind};
use crate::error::{Result, WatchError};

/// Every configured account client, keyed by account id. Built once at
/// startup.
#[derive(Clone, Default)]
pub struct AccountDirectory {
    clients: Arc<BTreeMap<String, Arc<dyn AccountClient>>>,
}

impl std::fmt::Debug for AccountDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.clients.keys()).finish()
    }
}

impl AccountDirectory {
    /// Index `clients` by their account id.
    pub fn new(clients: impl IntoIterator<Item = Arc<dyn AccountClient>>) -> Self {
        let clients = clients
            .into_iter()
            .map(|client| (client.account_id().to_owned(), client))
            .collect();
        Self {
            clients: Arc::new(clients),
        }
    }

    /// Client of `account_id`, if configured.
    pub fn get(&self, account_id: &str) -> Option<Arc<dyn AccountClient>> {
        self.clients.get(account_id).cloned()
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no account is configured.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send a plain `m.text` message as `sender`.
    pub async fn send_as(&self, sender: &str, room_id: &str, text: &str) -> Result<()> {
        let client = self
            .clients
            .get(sender)
            .ok_or_else(|| WatchError::UnknownAccount(sender.to_owned()))?;
        client.send_message(room_id, MessageKind::Text, text).await?;
        Ok(())
    }
}
