use std::sync::Arc;
use tracing::{info, warn};

use crate::account::types::MINUTE_MS;
use crate::account::{Account, AccountStatus, AccountStore};
use crate::error::PipelineError;

use super::audit::SessionAuditor;
use super::auth::expect_status;

/// Pending Queue Scheduler. The wait is derived from the stored
/// `enqueued_at`, so nothing is held in memory between sweeps.
pub struct PendingQueue {
    store: Arc<AccountStore>,
    auditor: Arc<SessionAuditor>,
    default_wait_minutes: u64,
    claim_lease_ms: u64,
}

impl PendingQueue {
    pub fn new(
        store: Arc<AccountStore>,
        auditor: Arc<SessionAuditor>,
        default_wait_minutes: u64,
        claim_lease_minutes: u64,
    ) -> Self {
        Self {
            store,
            auditor,
            default_wait_minutes,
            claim_lease_ms: claim_lease_minutes.saturating_mul(MINUTE_MS),
        }
    }

    /// First session audit, then `pending_review`. A failed enumeration holds
    /// the account with an unknown session count; the final decision makes
    /// the call after its own fresh read. Only the caller that wins the stage
    /// claim talks to the provider; any other gets the stored record back.
    pub async fn enqueue(&self, account: &Account, now: u64) -> Result<Account, PipelineError> {
        expect_status(account, AccountStatus::SessionAuditPending)?;
        let token = account
            .session_token
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidState("no session token".to_string()))?;

        let claim = self.store.claim_stage(
            &account.id,
            AccountStatus::SessionAuditPending,
            now,
            self.claim_lease_ms,
            |_| {},
        )?;
        if !claim.applied() {
            info!("Session audit of account {} already in progress", account.id);
            return Ok(claim.into_account());
        }

        let (initial_count, logged_out) = match self.auditor.audit(token).await {
            Ok(report) => (Some(report.sessions_seen), report.logged_out),
            Err(PipelineError::EnumerationFailed(reason)) => {
                warn!("⏸️ Account {} held with unknown session count: {}", account.id, reason);
                (None, 0)
            }
            Err(e) => {
                self.store
                    .release_stage(&account.id, AccountStatus::SessionAuditPending, now, |_| {})?;
                return Err(e);
            }
        };

        let wait_minutes = match self.store.get_country(&account.country_code)? {
            Some(policy) => policy.wait_minutes,
            None => self.default_wait_minutes,
        };

        let outcome = self.store.transition(
            &account.id,
            |a| a.status == AccountStatus::SessionAuditPending && a.stage_claimed_at == Some(now),
            |a| {
                a.status = AccountStatus::PendingReview;
                a.enqueued_at = Some(now);
                a.wait_minutes = wait_minutes;
                a.initial_session_count = initial_count;
                a.devices_logged_out += logged_out;
                a.last_audit_at = Some(now);
                a.stage_claimed_at = None;
                a.updated_at = now;
            },
        )?;
        if outcome.applied() {
            info!(
                "⏳ Account {} pending review for {} minutes",
                account.id, wait_minutes
            );
        }
        Ok(outcome.into_account())
    }

    /// Accounts whose wait has elapsed, plus claims abandoned past their lease.
    pub fn ready(&self, now: u64) -> Result<Vec<Account>, PipelineError> {
        let mut ready = self.store.list(|a| self.claimable(a, now))?;
        ready.sort_by_key(|a| a.ready_at().unwrap_or(0));
        Ok(ready)
    }

    /// Atomic claim for the final decision. `None` when another sweep won.
    pub fn claim(&self, id: &str, now: u64) -> Result<Option<Account>, PipelineError> {
        let outcome = self.store.transition(
            id,
            |a| self.claimable(a, now),
            |a| {
                a.status = AccountStatus::FinalValidation;
                a.claimed_at = Some(now);
                a.updated_at = now;
            },
        )?;
        Ok(outcome.applied().then(|| outcome.into_account()))
    }

    fn claimable(&self, account: &Account, now: u64) -> bool {
        match account.status {
            AccountStatus::PendingReview => account.is_ready(now),
            AccountStatus::FinalValidation => account
                .claimed_at
                .is_some_and(|at| now >= at.saturating_add(self.claim_lease_ms)),
            _ => false,
        }
    }
}
