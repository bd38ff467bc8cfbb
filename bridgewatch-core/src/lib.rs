//! # Bridgewatch Core
//!
//! Liveness monitoring for bridged messaging channels. Pushed bridge status
//! events are combined with fallback polling, and degraded channels raise
//! debounced alerts.
//!
//! ## Architecture
//!
//! - [`looper`]: repeating task executor with a dynamic sleep and a
//!   coalescing early-wake signal. Every monitored entity owns one.
//! - [`status`]: the bridge state model and the alert hysteresis arithmetic.
//! - [`bridge`]: one [`bridge::BridgeWatcher`] per (bridge, account) pair and
//!   the [`bridge::BridgesWatcher`] router for pushed payloads.
//! - [`account`]: per-account inactivity tracking over synchronized rooms,
//!   including bounded history backfill and the optional liveness probe.
//! - [`listeners`]: the outbound listener contracts and built-in listeners.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod account;
pub mod bridge;
pub mod error;
pub mod listeners;
pub mod looper;
pub mod status;

pub use error::{Result, WatchError};
pub use listeners::{
    AccountActivityListener, AccountActivityUpdate, BridgeStatusListener, BridgeUpdate,
    PushReceiver,
};
pub use looper::{LoopTask, Looper};
pub use status::{StatusPayload, StatusState};
