//! # Bridgewatch Server
//!
//! Runs every bridge and account watcher of a configuration and accepts
//! pushed bridge states on `POST /`.

pub mod app;
pub mod push;
