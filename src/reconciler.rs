//! User-set reconciliation.
//!
//! Diffs the authoritative user list from the panel database against the
//! locally cached provisioned set, and drives add/remove calls on the
//! engine to converge. Matching is full-record equality: a single changed
//! field on an existing user shows up as one removal plus one addition.
//! This delete-and-re-add behavior is deliberate; do not "fix" it into an
//! in-place update.

use tracing::{debug, warn};

use crate::config::AccountSettings;
use crate::error::AgentError;
use crate::model::{AddUserRequest, Protocol, UserRecord};
use crate::proxy::HandlerApi;

/// Counts of applied changes, for the cycle summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: u32,
    pub removed: u32,
}

/// Converge the engine's user set toward the authoritative list.
///
/// An empty authoritative list is treated as "database not yet populated"
/// and leaves the provisioned set untouched — never as "delete everyone".
///
/// Removals are applied first; a removal failure aborts the cycle and the
/// remaining changes are recomputed from scratch next cycle. Addition
/// failures are either tolerated (warn and continue) or escalated to a
/// fatal provisioning error, per `tolerate_invalid_credentials`.
pub async fn reconcile<H: HandlerApi + ?Sized>(
    handler: &H,
    authoritative: Vec<UserRecord>,
    provisioned: &mut Vec<UserRecord>,
    protocol: Protocol,
    account: &AccountSettings,
    tolerate_invalid_credentials: bool,
) -> Result<ReconcileOutcome, AgentError> {
    let mut outcome = ReconcileOutcome::default();

    if authoritative.is_empty() {
        debug!("authoritative user list empty, leaving provisioned set untouched");
        return Ok(outcome);
    }

    let additions: Vec<UserRecord> = authoritative
        .iter()
        .filter(|user| !provisioned.contains(user))
        .cloned()
        .collect();
    let removals: Vec<UserRecord> = provisioned
        .iter()
        .filter(|user| !authoritative.contains(user))
        .cloned()
        .collect();

    for user in &removals {
        handler.remove_user(&user.email).await?;
        if let Some(i) = provisioned.iter().position(|u| u == user) {
            provisioned.remove(i);
        }
        outcome.removed += 1;
        debug!(user_id = user.id, email = %user.email, "removed user");
    }

    for user in additions {
        let request = AddUserRequest::new(protocol, &user, account);
        if let Err(e) = handler.add_user(&request).await {
            if tolerate_invalid_credentials {
                warn!(user_id = user.id, email = %user.email, error = %e, "failed to add user, skipping");
                continue;
            }
            return Err(AgentError::FatalProvisioning(format!(
                "add user {} (id={}): {e}",
                user.email, user.id
            )));
        }
        outcome.added += 1;
        debug!(user_id = user.id, email = %user.email, "added user");
        provisioned.push(user);
    }

    Ok(outcome)
}
