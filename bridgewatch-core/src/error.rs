//! Error type shared by the watchers and their loops.

use thiserror::Error;

use crate::account::client::ClientError;

/// Everything a watcher iteration can fail with.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The status endpoint could not be reached.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A status response was not the expected JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The status endpoint answered with a non-success status.
    #[error("Status endpoint returned {status}: {body}")]
    StatusEndpoint {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The known remote id is absent from the status response.
    #[error("Remote state {0} missing from status response")]
    MissingRemoteState(String),

    /// The status response carried no remote state at all.
    #[error("Status response did not report any remote state")]
    EmptyRemoteState,

    /// Several remote states and no remote id to choose between them.
    #[error("Multiple remote states ({0}) without a configured remote_id, cannot pick one")]
    AmbiguousRemoteState(usize),

    /// A homeserver call failed.
    #[error("Account client error: {0}")]
    Client(#[from] ClientError),

    /// No client is configured for this account id.
    #[error("Account not found: {0}")]
    UnknownAccount(String),

    /// A setting could not be turned into a working component.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias over [`WatchError`].
pub type Result<T> = std::result::Result<T, WatchError>;
