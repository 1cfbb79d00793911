//! Final Decision Engine: a fresh session read, the anti-fraud gates, then a
//! terminal verdict. Acceptance credits the reward in the same store
//! transaction that records it.

use std::sync::Arc;
use tracing::{info, warn};

use crate::account::types::MINUTE_MS;
use crate::account::{Account, AccountStatus, AccountStore, FinalAudit};
use crate::error::PipelineError;

use super::audit::SessionAuditor;
use super::auth::expect_status;

pub const CANNOT_VERIFY: &str = "cannot verify single device";
pub const MULTIPLE_DEVICES: &str = "security risk — multiple devices";
pub const TAKEOVER_INCOMPLETE: &str = "credential takeover incomplete";
pub const TOO_YOUNG: &str = "account age below anti-fraud minimum";
pub const NOT_SINGLE_SESSION: &str = "final session count is not exactly one";

/// What the final session read established.
#[derive(Debug, Clone, Copy, Default)]
pub struct Observation {
    /// `None` when enumeration failed at any point.
    pub session_count: Option<u32>,
    pub logged_out: u32,
}

impl From<Observation> for FinalAudit {
    fn from(obs: Observation) -> Self {
        FinalAudit {
            session_count: obs.session_count,
            logged_out: obs.logged_out,
        }
    }
}

/// Gates in order; the first failure is the rejection reason.
pub fn verdict(
    account: &Account,
    observation: &Observation,
    now: u64,
    min_age_ms: u64,
) -> Result<(), &'static str> {
    let Some(count) = observation.session_count else {
        return Err(CANNOT_VERIFY);
    };
    if count > 1 {
        return Err(MULTIPLE_DEVICES);
    }
    if !account.operator_passphrase_set {
        return Err(TAKEOVER_INCOMPLETE);
    }
    if now.saturating_sub(account.created_at) <= min_age_ms {
        return Err(TOO_YOUNG);
    }
    if count != 1 {
        return Err(NOT_SINGLE_SESSION);
    }
    Ok(())
}

pub struct DecisionEngine {
    store: Arc<AccountStore>,
    auditor: Arc<SessionAuditor>,
    min_age_ms: u64,
}

impl DecisionEngine {
    pub fn new(store: Arc<AccountStore>, auditor: Arc<SessionAuditor>, min_account_age_minutes: u64) -> Self {
        Self {
            store,
            auditor,
            min_age_ms: min_account_age_minutes.saturating_mul(MINUTE_MS),
        }
    }

    /// Decide an account claimed into `final_validation`. Terminal accounts
    /// come back unchanged.
    pub async fn decide(&self, account: &Account, now: u64) -> Result<Account, PipelineError> {
        if account.is_terminal() {
            return Ok(account.clone());
        }
        expect_status(account, AccountStatus::FinalValidation)?;

        let observation = self.observe(account).await;
        let audit = FinalAudit::from(observation);

        let outcome = match verdict(account, &observation, now, self.min_age_ms) {
            Ok(()) => self.store.accept_and_credit(&account.id, audit, now)?,
            Err(reason) => self.store.reject(&account.id, reason, audit, now)?,
        };
        Ok(outcome.into_account())
    }

    async fn observe(&self, account: &Account) -> Observation {
        let Some(token) = account.session_token.as_deref() else {
            warn!("Account {} has no session token", account.id);
            return Observation::default();
        };

        let sessions = match self.auditor.enumerate(token).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Final enumeration failed for account {}: {}", account.id, e);
                return Observation::default();
            }
        };
        if sessions.len() <= 1 {
            return Observation {
                session_count: Some(sessions.len() as u32),
                logged_out: 0,
            };
        }

        info!(
            "🔎 Account {} still has {} sessions, terminating others",
            account.id,
            sessions.len()
        );
        let (logged_out, _) = self.auditor.terminate_others(token, &sessions).await;
        match self.auditor.enumerate(token).await {
            Ok(after) => Observation {
                session_count: Some(after.len() as u32),
                logged_out,
            },
            Err(e) => {
                warn!("Re-enumeration failed for account {}: {}", account.id, e);
                Observation {
                    session_count: None,
                    logged_out,
                }
            }
        }
    }
}
