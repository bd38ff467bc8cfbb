//! Configuration for Bridgewatch.
//!
//! A single TOML (or JSON) file describes the push endpoint, the bridges and
//! their watched accounts, the accounts' homeserver credentials and
//! inactivity settings, and the optional notification room. The loader
//! applies environment overrides and validates the result before any watcher
//! is started.

pub mod error;
pub mod loader;
pub mod models;
pub mod validation;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader, DEFAULT_CONFIG_PATH};
pub use models::{
    AccountConfig, BridgeAccountConfig, BridgeConfig, Config, ListenConfig, NotifyConfig,
    RoomNotifyConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
