//! Core types and the control plane.
//!
//! - `store`/`config`: workspace layout and `gatehouse.toml`
//! - `registry`: tool registration and the invocation boundary
//! - `intents`/`gatekeeper`: active intents and the pre-dispatch gate
//! - `hooks`: post-apply hooks run after edits land
//! - `trace`: the append-only audit ledger
//! - `dispatch`/`orchestrator`: gated model calls and session wiring

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gatekeeper;
pub mod hooks;
pub mod intents;
pub mod logging;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod store;
pub mod time;
pub mod trace;
