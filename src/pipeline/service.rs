use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::account::{
    Account, AccountStatus, AccountStore, AccountView, CountryPolicy, FinalAudit, PassphraseVault,
};
use crate::client::MessagingClient;
use crate::config::PipelineConfig;
use crate::error::PipelineError;

use super::audit::SessionAuditor;
use super::auth::AuthSequencer;
use super::decision::DecisionEngine;
use super::eligibility::{Admission, EligibilityGate};
use super::queue::PendingQueue;
use super::takeover::CredentialTakeover;
use super::{system_clock, Clock};

/// Outcome of one "process ready accounts" pass.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub examined: u32,
    pub claimed: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub failed: u32,
}

/// Entry point for every stage trigger. Whatever the caller asked for, the
/// account is advanced from its stored status through one dispatch table.
pub struct IntakeService {
    store: Arc<AccountStore>,
    gate: EligibilityGate,
    auth: AuthSequencer,
    takeover: CredentialTakeover,
    queue: PendingQueue,
    decision: DecisionEngine,
    vault: Arc<PassphraseVault>,
    clock: Clock,
}

impl IntakeService {
    pub fn new(
        store: Arc<AccountStore>,
        client: Arc<dyn MessagingClient>,
        vault: Arc<PassphraseVault>,
        config: &PipelineConfig,
    ) -> Self {
        let auditor = Arc::new(SessionAuditor::new(client.clone()));
        Self {
            gate: EligibilityGate::new(store.clone()),
            auth: AuthSequencer::new(
                store.clone(),
                client.clone(),
                vault.clone(),
                config.code_length,
                config.max_verification_attempts,
            ),
            takeover: CredentialTakeover::new(
                store.clone(),
                client,
                vault.clone(),
                config.operator_passphrase.clone(),
                config.claim_lease_minutes,
            ),
            queue: PendingQueue::new(
                store.clone(),
                auditor.clone(),
                config.default_wait_minutes,
                config.claim_lease_minutes,
            ),
            decision: DecisionEngine::new(store.clone(), auditor, config.min_account_age_minutes),
            store,
            vault,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Submit (or re-submit) a phone number. New numbers get a code sent;
    /// known ones resume where they stopped.
    pub async fn submit_phone(&self, phone_number: &str, user_id: &str) -> Result<AccountView, PipelineError> {
        let now = self.now();
        let account = match self.gate.admit(phone_number, user_id, now)? {
            Admission::Terminal(account) => return Ok(account.view(now)),
            Admission::Created(account) | Admission::Resume(account) => account,
        };
        let account = self.resume(account, now).await?;
        Ok(account.view(now))
    }

    pub async fn submit_code(
        &self,
        user_id: &str,
        account_id: &str,
        code: &str,
    ) -> Result<AccountView, PipelineError> {
        self.owned(account_id, user_id)?;
        let now = self.now();
        let account = self.auth.submit_code(account_id, code, now).await?;
        let account = self.resume(account, now).await?;
        Ok(account.view(now))
    }

    pub async fn submit_secondary_passphrase(
        &self,
        user_id: &str,
        account_id: &str,
        passphrase: &str,
    ) -> Result<AccountView, PipelineError> {
        self.owned(account_id, user_id)?;
        let now = self.now();
        let account = self
            .auth
            .submit_secondary_passphrase(account_id, passphrase, now)
            .await?;
        let account = self.resume(account, now).await?;
        Ok(account.view(now))
    }

    pub async fn provide_owner_passphrase(
        &self,
        user_id: &str,
        account_id: &str,
        passphrase: &str,
    ) -> Result<AccountView, PipelineError> {
        self.owned(account_id, user_id)?;
        let now = self.now();
        let account = self.auth.provide_owner_passphrase(account_id, passphrase, now)?;
        let account = self.resume(account, now).await?;
        Ok(account.view(now))
    }

    pub fn status(&self, user_id: &str, account_id: &str) -> Result<AccountView, PipelineError> {
        Ok(self.owned(account_id, user_id)?.view(self.now()))
    }

    pub fn list_accounts(&self, user_id: &str) -> Result<Vec<AccountView>, PipelineError> {
        let now = self.now();
        Ok(self
            .store
            .list_by_owner(user_id)?
            .iter()
            .map(|a| a.view(now))
            .collect())
    }

    pub fn balance(&self, user_id: &str) -> Result<u64, PipelineError> {
        self.store.balance(&user_id.to_string())
    }

    pub fn list_pending(&self) -> Result<Vec<AccountView>, PipelineError> {
        let now = self.now();
        Ok(self
            .store
            .list_by_status(AccountStatus::PendingReview)?
            .iter()
            .map(|a| a.view(now))
            .collect())
    }

    /// Admin rejection of an account waiting in review.
    pub fn reject_pending(&self, account_id: &str, reason: &str) -> Result<AccountView, PipelineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PipelineError::InvalidInput("a rejection reason is required".to_string()));
        }
        let now = self.now();
        let outcome = self.store.reject_where(
            account_id,
            |a| a.status == AccountStatus::PendingReview,
            reason,
            FinalAudit::default(),
            now,
        )?;
        if !outcome.applied() {
            let account = outcome.into_account();
            return Err(PipelineError::WrongStage {
                expected: AccountStatus::PendingReview,
                actual: account.status,
            });
        }
        Ok(outcome.into_account().view(now))
    }

    /// Open the operator passphrase installed on an accepted account.
    pub fn operator_passphrase(&self, account_id: &str) -> Result<String, PipelineError> {
        let account = self.store.get(account_id)?.ok_or(PipelineError::NotFound)?;
        if account.status != AccountStatus::Accepted {
            return Err(PipelineError::WrongStage {
                expected: AccountStatus::Accepted,
                actual: account.status,
            });
        }
        let sealed = self
            .store
            .operator_passphrase(&account.id)?
            .ok_or_else(|| PipelineError::InvalidState("operator vault has no entry".to_string()))?;
        let passphrase = self.vault.open(&sealed)?;
        info!("🔑 Operator passphrase of account {} released to admin", account.id);
        Ok(passphrase)
    }

    pub fn upsert_country(&self, policy: &CountryPolicy) -> Result<CountryPolicy, PipelineError> {
        let saved = self.store.upsert_country(policy)?;
        info!(
            "🌍 Country {} ({}) capacity {}/{}, reward {}, wait {}m, active {}",
            saved.code,
            saved.name,
            saved.used_capacity,
            saved.max_capacity,
            saved.reward_amount,
            saved.wait_minutes,
            saved.active
        );
        Ok(saved)
    }

    pub fn list_countries(&self) -> Result<Vec<CountryPolicy>, PipelineError> {
        self.store.list_countries()
    }

    /// Claim every account whose review wait has elapsed and run the final
    /// decision on it. Overlapping sweeps are safe: each claim is a
    /// conditional transition and only its winner decides.
    pub async fn process_ready_accounts(&self) -> Result<SweepSummary, PipelineError> {
        let now = self.now();
        let ready = self.queue.ready(now)?;
        let mut summary = SweepSummary {
            examined: ready.len() as u32,
            ..Default::default()
        };

        for candidate in ready {
            let claimed = match self.queue.claim(&candidate.id, now) {
                Ok(Some(claimed)) => claimed,
                Ok(None) => continue,
                Err(e) => {
                    error!("Failed to claim account {}: {}", candidate.id, e);
                    summary.failed += 1;
                    continue;
                }
            };
            summary.claimed += 1;

            match self.decision.decide(&claimed, now).await {
                Ok(decided) => match decided.status {
                    AccountStatus::Accepted => summary.accepted += 1,
                    AccountStatus::Rejected => summary.rejected += 1,
                    _ => {}
                },
                Err(e) => {
                    // Stays claimed; a later sweep re-claims it after the lease.
                    error!("Final decision failed for account {}: {}", claimed.id, e);
                    summary.failed += 1;
                }
            }
        }

        if summary.examined > 0 {
            info!(
                "🧹 Sweep: {} ready, {} claimed, {} accepted, {} rejected, {} failed",
                summary.examined, summary.claimed, summary.accepted, summary.rejected, summary.failed
            );
        }
        Ok(summary)
    }

    /// Single dispatch from stored status. Statuses waiting on owner input
    /// or on the sweep come back unchanged.
    async fn resume(&self, account: Account, now: u64) -> Result<Account, PipelineError> {
        let mut current = account;
        loop {
            let next = match current.status {
                AccountStatus::Submitted | AccountStatus::AwaitingOtp => {
                    return self.auth.request_code(&current, now).await;
                }
                AccountStatus::CredentialTakeoverPending => self.takeover.run(&current, now).await?,
                AccountStatus::SessionAuditPending => self.queue.enqueue(&current, now).await?,
                AccountStatus::AwaitingSecondaryPassphrase
                | AccountStatus::PendingReview
                | AccountStatus::FinalValidation
                | AccountStatus::Accepted
                | AccountStatus::Rejected => return Ok(current),
            };
            if next.status == current.status {
                debug!("Account {} stays {}", next.id, next.status);
                return Ok(next);
            }
            current = next;
        }
    }

    fn owned(&self, account_id: &str, user_id: &str) -> Result<Account, PipelineError> {
        match self.store.get(account_id)? {
            Some(account) if account.owner_user_id == user_id => Ok(account),
            _ => Err(PipelineError::NotFound),
        }
    }
}
