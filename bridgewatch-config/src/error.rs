//! Configuration load errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the model.
    #[error("invalid TOML config {path}: {source}")]
    Toml {
        /// Config file path.
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The file is not valid JSON for the model.
    #[error("invalid JSON config {path}: {source}")]
    Json {
        /// Config file path.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A duration that must be positive is zero.
    #[error("{scope}: {field} must be greater than zero")]
    ZeroDuration {
        /// Bridge or account the setting belongs to.
        scope: String,
        /// Setting name.
        field: &'static str,
    },

    /// A status endpoint or homeserver URL does not parse.
    #[error("{scope}: invalid url {url:?}: {source}")]
    InvalidUrl {
        /// Bridge or account the setting belongs to.
        scope: String,
        /// Rejected value.
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(
        "account {account}, bridge {bridge}: liveness probe sender {sender} is not a configured account"
    )]
    /// A liveness probe names a sender that is not a configured account.
    UnknownProbeSender {
        /// Watching account.
        account: String,
        /// Watched bridge.
        bridge: String,
        /// Configured sender.
        sender: String,
    },

    /// `notify.room` names an account that is not configured.
    #[error("notify room account {0} is not a configured account")]
    UnknownNotifyAccount(String),
}
