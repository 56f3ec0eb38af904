//! Data model: node metadata, user records, and accounting rows.

use serde::{Deserialize, Serialize};

use crate::config::AccountSettings;

/// Metadata for the local proxy node, loaded from the panel database once
/// at startup.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node identifier.
    pub id: i64,
    /// Billing multiplier applied to raw traffic before it is accounted
    /// toward a user's cumulative usage.
    pub traffic_rate: f64,
}

/// One user as provisioned on the proxy engine (or as stored in the panel
/// database — both sides share this shape).
///
/// Equality is full-record: two entries describe "the same user state"
/// only if every field matches. The reconciler relies on this — any
/// single-field change (credential rotation, port change, relabel) shows
/// up as one removal plus one addition, never an in-place update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Panel-side numeric identifier.
    pub id: i64,
    /// Unique email-like label; doubles as the engine-side user key.
    pub email: String,
    /// Secret or identifier credential, depending on protocol family.
    pub credential: String,
    /// Listening port assigned to the user.
    pub port: i32,
}

/// Per-user billed traffic delta for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficDelta {
    pub uplink: u64,
    pub downlink: u64,
}

/// One traffic accounting row, written per user per cycle when the user
/// had nonzero observed traffic. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficLogEntry {
    pub user_id: i64,
    pub node_id: i64,
    /// Raw uplink bytes as reported by the engine (before billing rate).
    pub uplink: u64,
    /// Raw downlink bytes as reported by the engine (before billing rate).
    pub downlink: u64,
    /// Billing rate in effect when the row was written.
    pub rate: f64,
    /// Human-readable combined billed traffic, e.g. "4.3K".
    pub traffic: String,
}

/// One liveness row per cycle. Append-only.
#[derive(Debug, Clone)]
pub struct NodeHeartbeat {
    pub node_id: i64,
    /// Seconds since the agent process started.
    pub uptime_secs: u64,
    /// System load averages formatted as "L1 L5 L15".
    pub load_avg: String,
}

/// One row per cycle with a nonzero online-user count. Append-only.
#[derive(Debug, Clone)]
pub struct NodeOnlineSnapshot {
    pub node_id: i64,
    pub online_users: u32,
}

/// Protocol family of the managed inbound. Resolved once at startup from
/// the inbound configuration, not per user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Identifier-based accounts.
    Vless,
    /// Password-based accounts.
    Trojan,
    /// Identifier + alter-id + cipher accounts (default family).
    #[default]
    Vmess,
}

/// Protocol-specific account payload sent to the engine's admin API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccountPayload {
    Vless {
        id: String,
    },
    Trojan {
        password: String,
    },
    Vmess {
        id: String,
        alter_id: u32,
        security: String,
    },
}

impl AccountPayload {
    /// Build the payload for a user under the given protocol family.
    pub fn for_user(protocol: Protocol, user: &UserRecord, account: &AccountSettings) -> Self {
        match protocol {
            Protocol::Vless => Self::Vless {
                id: user.credential.clone(),
            },
            Protocol::Trojan => Self::Trojan {
                password: user.credential.clone(),
            },
            Protocol::Vmess => Self::Vmess {
                id: user.credential.clone(),
                alter_id: account.alter_id,
                security: account.security.clone(),
            },
        }
    }
}

/// Full add-user request for the engine's admin API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddUserRequest {
    pub email: String,
    pub level: u32,
    pub account: AccountPayload,
}

impl AddUserRequest {
    /// Build the request for a user under the given protocol family.
    pub fn new(protocol: Protocol, user: &UserRecord, account: &AccountSettings) -> Self {
        Self {
            email: user.email.clone(),
            level: account.level,
            account: AccountPayload::for_user(protocol, user, account),
        }
    }
}
