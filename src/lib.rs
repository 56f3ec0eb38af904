//! Panel agent — keeps a proxy engine node in sync with a centralized
//! management panel database.
//!
//! Every cycle the agent pings the panel database, writes a heartbeat,
//! collects per-user traffic counters from the engine, records traffic
//! log rows and an online snapshot, advances cumulative per-user totals,
//! and reconciles the engine's user set against the authoritative list
//! for this node.
//!
//! # Usage
//!
//! ```bash
//! panel-agent -c agent.toml
//! ```
//!
//! The agent TOML needs `node_id`, a `[database]` URL, and the engine's
//! `[proxy]` admin API address. Everything else has defaults.

pub mod cli;
pub mod collector;
pub mod config;
pub mod cycle;
pub mod db;
pub mod error;
pub mod model;
pub mod proxy;
pub mod reconciler;
pub mod scheduler;
pub mod util;

pub use cli::AgentArgs;
pub use config::AgentConfig;
pub use error::AgentError;
