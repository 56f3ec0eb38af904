//! In-memory proxy engine stand-in.
//!
//! Implements both engine surfaces against local state and records every
//! administrative call, so reconciliation and accounting logic can be
//! exercised without a running engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::model::AddUserRequest;

use super::{HandlerApi, ProxyError, StatsApi};

/// One recorded administrative call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddUser(String),
    RemoveUser(String),
}

#[derive(Debug, Default)]
struct Inner {
    /// Emails currently provisioned on the fake engine.
    users: HashSet<String>,
    /// Pending (uplink, downlink) counters per email; drained on read.
    counters: HashMap<String, (u64, u64)>,
    /// Recorded administrative calls, in order.
    calls: Vec<Call>,
    /// Emails whose add call should fail.
    fail_adds: HashSet<String>,
    /// Emails whose remove call should fail.
    fail_removes: HashSet<String>,
    /// Emails whose stats reads should fail.
    fail_stats: HashSet<String>,
}

/// In-memory engine. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryProxy {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProxy {
    /// Create a new empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a pending traffic counter for a user (additive).
    pub fn set_traffic(&self, email: &str, uplink: u64, downlink: u64) {
        let mut inner = self.inner.lock();
        let entry = inner.counters.entry(email.to_string()).or_default();
        entry.0 += uplink;
        entry.1 += downlink;
    }

    /// Make subsequent add calls for this email fail.
    pub fn fail_add(&self, email: &str) {
        self.inner.lock().fail_adds.insert(email.to_string());
    }

    /// Make subsequent remove calls for this email fail.
    pub fn fail_remove(&self, email: &str) {
        self.inner.lock().fail_removes.insert(email.to_string());
    }

    /// Make subsequent stats reads for this email fail.
    pub fn fail_stats(&self, email: &str) {
        self.inner.lock().fail_stats.insert(email.to_string());
    }

    /// Recorded administrative calls, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    /// Number of add/remove calls recorded so far.
    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Whether the engine currently knows this email.
    pub fn contains(&self, email: &str) -> bool {
        self.inner.lock().users.contains(email)
    }

    /// Number of users currently provisioned on the engine.
    pub fn user_count(&self) -> usize {
        self.inner.lock().users.len()
    }
}

#[async_trait]
impl HandlerApi for MemoryProxy {
    async fn add_user(&self, request: &AddUserRequest) -> Result<(), ProxyError> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::AddUser(request.email.clone()));
        if inner.fail_adds.contains(&request.email) {
            return Err(ProxyError::Api {
                status: 400,
                message: "invalid account payload".to_string(),
            });
        }
        inner.users.insert(request.email.clone());
        Ok(())
    }

    async fn remove_user(&self, email: &str) -> Result<(), ProxyError> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::RemoveUser(email.to_string()));
        if inner.fail_removes.contains(email) {
            return Err(ProxyError::Api {
                status: 500,
                message: "engine unavailable".to_string(),
            });
        }
        if !inner.users.remove(email) {
            return Err(ProxyError::NotFound(email.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StatsApi for MemoryProxy {
    async fn user_uplink(&self, email: &str) -> Result<u64, ProxyError> {
        let mut inner = self.inner.lock();
        if inner.fail_stats.contains(email) {
            return Err(ProxyError::transport("stats channel broken"));
        }
        let value = match inner.counters.get_mut(email) {
            Some(counter) => std::mem::take(&mut counter.0),
            None => 0,
        };
        Ok(value)
    }

    async fn user_downlink(&self, email: &str) -> Result<u64, ProxyError> {
        let mut inner = self.inner.lock();
        if inner.fail_stats.contains(email) {
            return Err(ProxyError::transport("stats channel broken"));
        }
        let value = match inner.counters.get_mut(email) {
            Some(counter) => std::mem::take(&mut counter.1),
            None => 0,
        };
        Ok(value)
    }
}
