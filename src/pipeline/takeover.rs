use std::sync::Arc;
use tracing::{error, info, warn};

use crate::account::types::MINUTE_MS;
use crate::account::{Account, AccountStatus, AccountStore, FinalAudit, PassphraseVault, Transition};
use crate::client::MessagingClient;
use crate::config::OperatorPassphrase;
use crate::error::PipelineError;

use super::auth::expect_status;

pub const TAKEOVER_FAILED: &str = "credential takeover failed";

/// Replaces the owner's secondary passphrase with an operator-controlled one.
///
/// The operator passphrase is sealed onto the account before the provider is
/// told about it, so a run interrupted after the provider call can be resumed
/// with the same value.
pub struct CredentialTakeover {
    store: Arc<AccountStore>,
    client: Arc<dyn MessagingClient>,
    vault: Arc<PassphraseVault>,
    operator: OperatorPassphrase,
    claim_lease_ms: u64,
}

impl CredentialTakeover {
    pub fn new(
        store: Arc<AccountStore>,
        client: Arc<dyn MessagingClient>,
        vault: Arc<PassphraseVault>,
        operator: OperatorPassphrase,
        claim_lease_minutes: u64,
    ) -> Self {
        Self {
            store,
            client,
            vault,
            operator,
            claim_lease_ms: claim_lease_minutes.saturating_mul(MINUTE_MS),
        }
    }

    /// Run the takeover if this caller wins the stage claim. A caller that
    /// loses it gets the stored record back untouched.
    pub async fn run(&self, account: &Account, now: u64) -> Result<Account, PipelineError> {
        expect_status(account, AccountStatus::CredentialTakeoverPending)?;
        let token = account
            .session_token
            .clone()
            .ok_or_else(|| PipelineError::InvalidState("no session token".to_string()))?;

        let (claimed, operator, resumed) = match self.claim(account, now)? {
            Some(prepared) => prepared,
            None => {
                info!("Takeover of account {} already in progress", account.id);
                return self.current(&account.id);
            }
        };

        match self.take_over(&claimed, &token, &operator, resumed, now).await {
            Ok(done) => Ok(done),
            Err(PipelineError::OwnerPassphraseRequired) => {
                self.store.release_stage(
                    &claimed.id,
                    AccountStatus::CredentialTakeoverPending,
                    now,
                    |a| a.had_owner_passphrase = true,
                )?;
                Err(PipelineError::OwnerPassphraseRequired)
            }
            Err(e) => {
                self.store
                    .release_stage(&claimed.id, AccountStatus::CredentialTakeoverPending, now, |_| {})?;
                Err(e)
            }
        }
    }

    async fn take_over(
        &self,
        account: &Account,
        token: &str,
        operator: &str,
        resumed: bool,
        now: u64,
    ) -> Result<Account, PipelineError> {
        let state = self.client.passphrase_state(token).await?;

        if resumed && state.has_passphrase {
            // A previous run may already have installed the operator value.
            if self
                .client
                .set_or_change_passphrase(token, operator, Some(operator))
                .await
                .is_ok()
            {
                info!("🔐 Operator passphrase confirmed on account {}", account.id);
                return self.finish(account, account.had_owner_passphrase, now);
            }
        }

        let mut current = None;
        if state.has_passphrase {
            let owner = match &account.owner_passphrase_sealed {
                Some(sealed) => self.vault.open(sealed)?,
                None => return Err(PipelineError::OwnerPassphraseRequired),
            };

            match self.client.disable_passphrase(token, &owner).await {
                Ok(()) => info!("🔓 Owner passphrase disabled on account {}", account.id),
                Err(e) => {
                    warn!(
                        "Disabling owner passphrase failed on account {}, changing it instead: {}",
                        account.id, e
                    );
                    current = Some(owner);
                }
            }
        }

        if let Err(e) = self
            .client
            .set_or_change_passphrase(token, operator, current.as_deref())
            .await
        {
            error!("❌ Operator passphrase install failed on account {}: {}", account.id, e);
            return Ok(self
                .store
                .reject(&account.id, TAKEOVER_FAILED, FinalAudit::default(), now)?
                .into_account());
        }

        let had_owner = state.has_passphrase || account.had_owner_passphrase;
        self.finish(account, had_owner, now)
    }

    /// Take the stage claim and, in the same write, persist the sealed
    /// operator passphrase unless a previous attempt already stored one.
    /// Returns the claimed record, the operator value and whether it was
    /// reused; `None` when the account moved on or another worker holds it.
    fn claim(
        &self,
        account: &Account,
        now: u64,
    ) -> Result<Option<(Account, String, bool)>, PipelineError> {
        let fresh = self.operator.next();
        let sealed = self.vault.seal(&fresh)?;
        let outcome = self.store.claim_stage(
            &account.id,
            AccountStatus::CredentialTakeoverPending,
            now,
            self.claim_lease_ms,
            |a| {
                if a.operator_passphrase_sealed.is_none() {
                    a.operator_passphrase_sealed = Some(sealed.clone());
                }
            },
        )?;

        let Transition::Applied(claimed) = outcome else {
            return Ok(None);
        };
        let reused = match &claimed.operator_passphrase_sealed {
            Some(stored) if *stored == sealed => None,
            Some(stored) => Some(self.vault.open(stored)?),
            None => {
                return Err(PipelineError::InvalidState(
                    "operator passphrase missing after claim".to_string(),
                ))
            }
        };
        Ok(Some(match reused {
            Some(operator) => (claimed, operator, true),
            None => (claimed, fresh, false),
        }))
    }

    fn finish(&self, account: &Account, had_owner: bool, now: u64) -> Result<Account, PipelineError> {
        let outcome = self.store.complete_takeover(&account.id, had_owner, now)?;
        if outcome.applied() {
            info!("🔐 Credential takeover complete for account {}", account.id);
        }
        Ok(outcome.into_account())
    }

    fn current(&self, id: &str) -> Result<Account, PipelineError> {
        self.store.get(id)?.ok_or(PipelineError::NotFound)
    }
}
