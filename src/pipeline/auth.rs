//! Authentication Sequencer: one-time code, then the optional secondary
//! passphrase, ending with a finalized session token.

use std::sync::Arc;
use tracing::{info, warn};

use crate::account::phone;
use crate::account::{Account, AccountStatus, AccountStore, FinalAudit, PassphraseVault, Transition};
use crate::client::{ClientError, MessagingClient, RedeemOutcome};
use crate::error::PipelineError;

pub const TOO_MANY_ATTEMPTS: &str = "too many failed verification attempts";

pub struct AuthSequencer {
    store: Arc<AccountStore>,
    client: Arc<dyn MessagingClient>,
    vault: Arc<PassphraseVault>,
    code_length: usize,
    max_attempts: u32,
}

impl AuthSequencer {
    pub fn new(
        store: Arc<AccountStore>,
        client: Arc<dyn MessagingClient>,
        vault: Arc<PassphraseVault>,
        code_length: usize,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            client,
            vault,
            code_length,
            max_attempts,
        }
    }

    /// Dispatch a code. Also used to resend while `awaiting_otp`. On failure
    /// the account stays where it was.
    pub async fn request_code(&self, account: &Account, now: u64) -> Result<Account, PipelineError> {
        let resendable = |a: &Account| {
            matches!(a.status, AccountStatus::Submitted | AccountStatus::AwaitingOtp)
        };
        if !resendable(account) {
            return Err(PipelineError::WrongStage {
                expected: AccountStatus::Submitted,
                actual: account.status,
            });
        }

        let request = self.client.request_code(&account.phone_number).await?;

        let outcome = self.store.transition(&account.id, resendable, |a| {
            a.status = AccountStatus::AwaitingOtp;
            a.correlation_handle = Some(request.correlation_handle.clone());
            a.interim_token = Some(request.interim_token.clone());
            a.updated_at = now;
        })?;
        if outcome.applied() {
            info!("📨 Code sent to {} (account {})", phone::mask(&account.phone_number), account.id);
        }
        Ok(outcome.into_account())
    }

    pub async fn submit_code(&self, account_id: &str, code: &str, now: u64) -> Result<Account, PipelineError> {
        let code = code.trim();
        if code.len() != self.code_length || !code.bytes().all(|c| c.is_ascii_digit()) {
            return Err(PipelineError::InvalidInput(format!(
                "code must be {} digits",
                self.code_length
            )));
        }

        let account = self.load(account_id)?;
        expect_status(&account, AccountStatus::AwaitingOtp)?;
        let (Some(interim), Some(handle)) = (&account.interim_token, &account.correlation_handle) else {
            return Err(PipelineError::InvalidState("no pending code request".to_string()));
        };

        let redeemed = match self.client.redeem_code(interim, handle, code).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.record_failure(&account, err, now)?),
        };

        let outcome = match redeemed {
            RedeemOutcome::Authenticated { final_token } => {
                self.store.transition_from(account_id, AccountStatus::AwaitingOtp, |a| {
                    a.status = AccountStatus::CredentialTakeoverPending;
                    a.session_token = Some(final_token.clone());
                    a.interim_token = None;
                    a.correlation_handle = None;
                    a.failed_attempts = 0;
                    a.updated_at = now;
                })?
            }
            RedeemOutcome::PassphraseRequired { interim_token } => {
                self.store.transition_from(account_id, AccountStatus::AwaitingOtp, |a| {
                    a.status = AccountStatus::AwaitingSecondaryPassphrase;
                    a.interim_token = Some(interim_token.clone());
                    a.correlation_handle = None;
                    a.had_owner_passphrase = true;
                    a.failed_attempts = 0;
                    a.updated_at = now;
                })?
            }
        };

        if let Transition::Applied(account) = &outcome {
            info!("🔓 Code accepted for account {}: now {}", account.id, account.status);
        }
        Ok(outcome.into_account())
    }

    pub async fn submit_secondary_passphrase(
        &self,
        account_id: &str,
        passphrase: &str,
        now: u64,
    ) -> Result<Account, PipelineError> {
        if passphrase.is_empty() {
            return Err(PipelineError::InvalidInput("passphrase is required".to_string()));
        }

        let account = self.load(account_id)?;
        expect_status(&account, AccountStatus::AwaitingSecondaryPassphrase)?;
        let Some(interim) = &account.interim_token else {
            return Err(PipelineError::InvalidState("no pending passphrase challenge".to_string()));
        };

        let final_token = match self.client.verify_secondary_passphrase(interim, passphrase).await {
            Ok(token) => token,
            Err(err) => return Err(self.record_failure(&account, err, now)?),
        };

        // Held sealed until the credential takeover consumes it.
        let sealed = self.vault.seal(passphrase)?;
        let outcome = self.store.transition_from(
            account_id,
            AccountStatus::AwaitingSecondaryPassphrase,
            |a| {
                a.status = AccountStatus::CredentialTakeoverPending;
                a.session_token = Some(final_token.clone());
                a.interim_token = None;
                a.owner_passphrase_sealed = Some(sealed.clone());
                a.failed_attempts = 0;
                a.updated_at = now;
            },
        )?;

        if outcome.applied() {
            info!("🔓 Secondary passphrase accepted for account {}", account_id);
        }
        Ok(outcome.into_account())
    }

    /// Supply the owner's current passphrase when the provider reports one
    /// that authentication never asked for.
    pub fn provide_owner_passphrase(
        &self,
        account_id: &str,
        passphrase: &str,
        now: u64,
    ) -> Result<Account, PipelineError> {
        if passphrase.is_empty() {
            return Err(PipelineError::InvalidInput("passphrase is required".to_string()));
        }
        let account = self.load(account_id)?;
        expect_status(&account, AccountStatus::CredentialTakeoverPending)?;

        let sealed = self.vault.seal(passphrase)?;
        let outcome = self
            .store
            .transition_from(account_id, AccountStatus::CredentialTakeoverPending, |a| {
                a.owner_passphrase_sealed = Some(sealed.clone());
                a.had_owner_passphrase = true;
                a.updated_at = now;
            })?;
        Ok(outcome.into_account())
    }

    /// Count an authoritative refusal against the account, rejecting it once
    /// the retry budget is spent. Transient failures are not counted.
    /// Returns the error to surface.
    fn record_failure(
        &self,
        account: &Account,
        err: ClientError,
        now: u64,
    ) -> Result<PipelineError, PipelineError> {
        if err.is_transient() {
            warn!("Provider unavailable for account {}: {}", account.id, err);
            return Ok(err.into());
        }

        let outcome = self.store.transition_from(&account.id, account.status, |a| {
            a.failed_attempts += 1;
            a.updated_at = now;
        })?;
        let attempts = outcome.into_account().failed_attempts;
        warn!(
            "Verification failed for account {} ({}/{}): {}",
            account.id, attempts, self.max_attempts, err
        );

        if attempts >= self.max_attempts {
            self.store
                .reject(&account.id, TOO_MANY_ATTEMPTS, FinalAudit::default(), now)?;
        }
        Ok(err.into())
    }

    fn load(&self, account_id: &str) -> Result<Account, PipelineError> {
        self.store.get(account_id)?.ok_or(PipelineError::NotFound)
    }
}

pub(crate) fn expect_status(account: &Account, expected: AccountStatus) -> Result<(), PipelineError> {
    if account.status == expected {
        Ok(())
    } else {
        Err(PipelineError::WrongStage {
            expected,
            actual: account.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::CountryPolicy;
    use crate::client::mock::{self, ScriptedClient};
    use crate::storage::Storage;

    struct Fixture {
        store: Arc<AccountStore>,
        client: Arc<ScriptedClient>,
        vault: Arc<PassphraseVault>,
        auth: AuthSequencer,
    }

    fn fixture(client: ScriptedClient) -> Fixture {
        let store = Arc::new(AccountStore::new(Arc::new(Storage::temporary().unwrap())).unwrap());
        let client = Arc::new(client);
        let vault = Arc::new(PassphraseVault::new("test-secret").unwrap());
        let auth = AuthSequencer::new(store.clone(), client.clone(), vault.clone(), 5, 3);
        Fixture { store, client, vault, auth }
    }

    fn submitted(store: &AccountStore) -> Account {
        let policy = CountryPolicy {
            code: "1999".into(),
            name: "Testland".into(),
            max_capacity: 10,
            used_capacity: 0,
            reward_amount: 10,
            wait_minutes: 60,
            active: true,
        };
        store.upsert_country(&policy).unwrap();
        let account = Account::new("a1".into(), "+19995550001".into(), "u1".into(), &policy, 0);
        store.create_with_capacity(&account).unwrap();
        account
    }

    #[tokio::test]
    async fn test_code_without_passphrase_authenticates() {
        let f = fixture(ScriptedClient::new());
        let account = submitted(&f.store);

        let waiting = f.auth.request_code(&account, 1).await.unwrap();
        assert_eq!(waiting.status, AccountStatus::AwaitingOtp);
        assert_eq!(waiting.correlation_handle.as_deref(), Some(mock::HANDLE));

        let authed = f.auth.submit_code("a1", mock::VALID_CODE, 2).await.unwrap();
        assert_eq!(authed.status, AccountStatus::CredentialTakeoverPending);
        assert_eq!(authed.session_token.as_deref(), Some(mock::FINAL_TOKEN));
        assert!(authed.interim_token.is_none());
        assert!(!authed.had_owner_passphrase);
    }

    #[tokio::test]
    async fn test_secondary_passphrase_flow() {
        let f = fixture(ScriptedClient::new().with_passphrase("owner-pass"));
        let account = submitted(&f.store);
        f.auth.request_code(&account, 1).await.unwrap();

        let challenged = f.auth.submit_code("a1", mock::VALID_CODE, 2).await.unwrap();
        assert_eq!(challenged.status, AccountStatus::AwaitingSecondaryPassphrase);
        assert_eq!(challenged.interim_token.as_deref(), Some(mock::INTERIM_2FA));

        let wrong = f.auth.submit_secondary_passphrase("a1", "nope", 3).await;
        assert!(matches!(wrong, Err(PipelineError::Provider(ClientError::Rejected { .. }))));
        let unchanged = f.store.get("a1").unwrap().unwrap();
        assert_eq!(unchanged.status, AccountStatus::AwaitingSecondaryPassphrase);
        assert_eq!(unchanged.failed_attempts, 1);

        let authed = f.auth.submit_secondary_passphrase("a1", "owner-pass", 4).await.unwrap();
        assert_eq!(authed.status, AccountStatus::CredentialTakeoverPending);
        assert_eq!(authed.session_token.as_deref(), Some(mock::FINAL_TOKEN));
        assert!(authed.interim_token.is_none());
        assert!(authed.had_owner_passphrase);

        let sealed = authed.owner_passphrase_sealed.unwrap();
        assert_eq!(f.vault.open(&sealed).unwrap(), "owner-pass");
    }

    #[tokio::test]
    async fn test_bad_code_format_makes_no_call() {
        let f = fixture(ScriptedClient::new());
        let account = submitted(&f.store);
        f.auth.request_code(&account, 1).await.unwrap();

        for code in ["1234", "123456", "12a45", ""] {
            assert!(matches!(
                f.auth.submit_code("a1", code, 2).await,
                Err(PipelineError::InvalidInput(_))
            ));
        }
        assert_eq!(f.client.count_calls("redeem_code"), 0);
        assert_eq!(f.store.get("a1").unwrap().unwrap().failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_wrong_codes_exhaust_attempts() {
        let f = fixture(ScriptedClient::new());
        let account = submitted(&f.store);
        f.auth.request_code(&account, 1).await.unwrap();

        for _ in 0..2 {
            assert!(f.auth.submit_code("a1", "00000", 2).await.is_err());
            assert_eq!(f.store.get("a1").unwrap().unwrap().status, AccountStatus::AwaitingOtp);
        }
        assert!(f.auth.submit_code("a1", "00000", 3).await.is_err());

        let rejected = f.store.get("a1").unwrap().unwrap();
        assert_eq!(rejected.status, AccountStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some(TOO_MANY_ATTEMPTS));

        assert!(matches!(
            f.auth.submit_code("a1", mock::VALID_CODE, 4).await,
            Err(PipelineError::WrongStage { .. })
        ));
    }

    #[tokio::test]
    async fn test_request_code_failure_leaves_submitted() {
        let f = fixture(ScriptedClient::new().failing_request_code(ClientError::Transient("down".into())));
        let account = submitted(&f.store);

        let err = f.auth.request_code(&account, 1).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(f.store.get("a1").unwrap().unwrap().status, AccountStatus::Submitted);
    }

    #[tokio::test]
    async fn test_provide_owner_passphrase_requires_takeover_stage() {
        let f = fixture(ScriptedClient::new());
        submitted(&f.store);

        assert!(matches!(
            f.auth.provide_owner_passphrase("a1", "x", 1),
            Err(PipelineError::WrongStage { .. })
        ));

        f.store
            .transition("a1", |_| true, |a| a.status = AccountStatus::CredentialTakeoverPending)
            .unwrap();
        let updated = f.auth.provide_owner_passphrase("a1", "owner", 2).unwrap();
        assert!(updated.had_owner_passphrase);
        assert!(updated.owner_passphrase_sealed.is_some());
    }
}
