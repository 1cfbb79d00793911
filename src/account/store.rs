//! Account storage: atomic conditional operations over the account,
//! phone index, country, balance and operator vault collections.

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult, Transactional,
};
use std::sync::Arc;
use tracing::info;

use super::phone;
use super::types::{Account, AccountId, AccountStatus, CountryPolicy, UserId};
use crate::error::PipelineError;
use crate::storage::{self, decode, encode, Storage};

const ACCOUNTS: &str = "accounts";
const PHONE_INDEX: &str = "phone_index";
const COUNTRIES: &str = "countries";
const BALANCES: &str = "balances";
const OPERATOR_VAULT: &str = "operator_vault";

/// Result of the create-if-absent insert.
#[derive(Debug, Clone)]
pub enum Creation {
    /// Carries the country policy as the transaction wrote it.
    Created(Account, CountryPolicy),
    /// Another record already holds the phone number.
    Existing(Account),
}

/// Result of a conditional read-modify-write.
#[derive(Debug, Clone)]
pub enum Transition {
    Applied(Account),
    /// Precondition did not hold; carries the record as found.
    Skipped(Account),
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn into_account(self) -> Account {
        match self {
            Transition::Applied(a) | Transition::Skipped(a) => a,
        }
    }
}

/// Outcome of a final-session audit handed to the store with a verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalAudit {
    pub session_count: Option<u32>,
    pub logged_out: u32,
}

/// Account store for all submitted accounts
pub struct AccountStore {
    accounts: sled::Tree,
    phones: sled::Tree,
    countries: sled::Tree,
    balances: sled::Tree,
    vault: sled::Tree,
}

impl AccountStore {
    pub fn new(storage: Arc<Storage>) -> Result<Self, PipelineError> {
        Ok(Self {
            accounts: storage.tree(ACCOUNTS)?,
            phones: storage.tree(PHONE_INDEX)?,
            countries: storage.tree(COUNTRIES)?,
            balances: storage.tree(BALANCES)?,
            vault: storage.tree(OPERATOR_VAULT)?,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Account>, PipelineError> {
        Ok(storage::get(&self.accounts, id)?)
    }

    pub fn find_by_phone(&self, phone: &str) -> Result<Option<Account>, PipelineError> {
        match self.phones.get(phone.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8_lossy(&id).into_owned();
                self.get(&id)
            }
            None => Ok(None),
        }
    }

    pub fn list<F>(&self, filter: F) -> Result<Vec<Account>, PipelineError>
    where
        F: Fn(&Account) -> bool,
    {
        let mut accounts = storage::scan(&self.accounts, filter)?;
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    pub fn list_by_status(&self, status: AccountStatus) -> Result<Vec<Account>, PipelineError> {
        self.list(|a| a.status == status)
    }

    pub fn list_by_owner(&self, owner: &str) -> Result<Vec<Account>, PipelineError> {
        self.list(|a| a.owner_user_id == owner)
    }

    /// Insert `account` unless its phone number is already indexed, reserving
    /// one unit of its country's capacity in the same transaction. The loser
    /// of a concurrent race observes the winner's record.
    pub fn create_with_capacity(&self, account: &Account) -> Result<Creation, PipelineError> {
        let phone_key = account.phone_number.as_bytes();
        let country_key = account.country_code.as_bytes();
        let id_key = account.id.as_bytes();

        let result: TransactionResult<Creation, PipelineError> =
            (&self.accounts, &self.phones, &self.countries).transaction(
                |(accounts, phones, countries)| {
                    if let Some(existing_id) = phones.get(phone_key)? {
                        let raw = accounts.get(&existing_id)?.ok_or_else(|| {
                            abort_with(PipelineError::InvalidState(
                                "phone index points at a missing account".to_string(),
                            ))
                        })?;
                        return Ok(Creation::Existing(decode_tx(&raw)?));
                    }

                    let raw = countries
                        .get(country_key)?
                        .ok_or_else(|| abort_with(PipelineError::CountryNotSupported))?;
                    let mut policy: CountryPolicy = decode_tx(&raw)?;
                    if !policy.active {
                        return Err(abort_with(PipelineError::CountryInactive(policy.name)));
                    }
                    if !policy.has_capacity() {
                        return Err(abort_with(PipelineError::NoCapacity(policy.name)));
                    }
                    policy.used_capacity += 1;

                    countries.insert(country_key, encode_tx(&policy)?)?;
                    accounts.insert(id_key, encode_tx(account)?)?;
                    phones.insert(phone_key, id_key)?;
                    Ok(Creation::Created(account.clone(), policy))
                },
            );

        settle(result)
    }

    /// Atomic conditional read-modify-write: `mutate` runs only when `guard`
    /// holds for the stored record.
    pub fn transition<G, M>(&self, id: &str, guard: G, mutate: M) -> Result<Transition, PipelineError>
    where
        G: Fn(&Account) -> bool,
        M: Fn(&mut Account),
    {
        let key = id.as_bytes();
        let result: TransactionResult<Transition, PipelineError> = self.accounts.transaction(|tx| {
            let raw = tx
                .get(key)?
                .ok_or_else(|| abort_with(PipelineError::NotFound))?;
            let mut account: Account = decode_tx(&raw)?;
            if !guard(&account) {
                return Ok(Transition::Skipped(account));
            }
            mutate(&mut account);
            tx.insert(key, encode_tx(&account)?)?;
            Ok(Transition::Applied(account))
        });

        settle(result)
    }

    /// Conditional transition on an exact expected status.
    pub fn transition_from<M>(
        &self,
        id: &str,
        expected: AccountStatus,
        mutate: M,
    ) -> Result<Transition, PipelineError>
    where
        M: Fn(&mut Account),
    {
        self.transition(id, |a| a.status == expected, mutate)
    }

    /// Exclusive claim on the stage at `expected` before its external side
    /// effects start. Skipped when the account moved on, or another worker
    /// holds a claim younger than `lease_ms`.
    pub fn claim_stage<M>(
        &self,
        id: &str,
        expected: AccountStatus,
        now: u64,
        lease_ms: u64,
        mutate: M,
    ) -> Result<Transition, PipelineError>
    where
        M: Fn(&mut Account),
    {
        self.transition(
            id,
            |a| a.status == expected && a.stage_free(now, lease_ms),
            |a| {
                a.stage_claimed_at = Some(now);
                a.updated_at = now;
                mutate(a);
            },
        )
    }

    /// Give up a stage claim taken at `claimed_at` without advancing, applying
    /// `mutate` in the same write. A claim re-taken by another worker after
    /// the lease is left alone.
    pub fn release_stage<M>(
        &self,
        id: &str,
        expected: AccountStatus,
        claimed_at: u64,
        mutate: M,
    ) -> Result<Transition, PipelineError>
    where
        M: Fn(&mut Account),
    {
        self.transition(
            id,
            |a| a.status == expected && a.stage_claimed_at == Some(claimed_at),
            |a| {
                a.stage_claimed_at = None;
                mutate(a);
            },
        )
    }

    /// Terminal rejection of any non-terminal account. Secrets held on the
    /// record are dropped with it.
    pub fn reject(
        &self,
        id: &str,
        reason: &str,
        audit: FinalAudit,
        now: u64,
    ) -> Result<Transition, PipelineError> {
        self.reject_where(id, |a| !a.is_terminal(), reason, audit, now)
    }

    /// Rejection restricted to records `guard` accepts (never terminal ones).
    pub fn reject_where<G>(
        &self,
        id: &str,
        guard: G,
        reason: &str,
        audit: FinalAudit,
        now: u64,
    ) -> Result<Transition, PipelineError>
    where
        G: Fn(&Account) -> bool,
    {
        let outcome = self.transition(
            id,
            |a| !a.is_terminal() && guard(a),
            |a| {
                a.status = AccountStatus::Rejected;
                a.rejection_reason = Some(reason.to_string());
                a.rejected_at = Some(now);
                a.updated_at = now;
                if audit.session_count.is_some() {
                    a.final_session_count = audit.session_count;
                    a.last_audit_at = Some(now);
                }
                a.devices_logged_out += audit.logged_out;
                a.stage_claimed_at = None;
                a.clear_secrets();
            },
        )?;
        if outcome.applied() {
            info!("❌ Account {} rejected: {}", id, reason);
        }
        Ok(outcome)
    }

    /// Record a completed credential takeover: the write-ahead operator
    /// passphrase moves to the operator vault and every passphrase is
    /// cleared from the account record, in one transaction.
    pub fn complete_takeover(
        &self,
        id: &str,
        had_owner_passphrase: bool,
        now: u64,
    ) -> Result<Transition, PipelineError> {
        let key = id.as_bytes();
        let result: TransactionResult<Transition, PipelineError> =
            (&self.accounts, &self.vault).transaction(|(accounts, vault)| {
                let raw = accounts
                    .get(key)?
                    .ok_or_else(|| abort_with(PipelineError::NotFound))?;
                let mut account: Account = decode_tx(&raw)?;
                if account.status != AccountStatus::CredentialTakeoverPending {
                    return Ok(Transition::Skipped(account));
                }

                if let Some(sealed) = account.operator_passphrase_sealed.take() {
                    vault.insert(key, sealed)?;
                }
                account.owner_passphrase_sealed = None;
                account.had_owner_passphrase = had_owner_passphrase;
                account.operator_passphrase_set = true;
                account.operator_passphrase_set_at = Some(now);
                account.status = AccountStatus::SessionAuditPending;
                account.stage_claimed_at = None;
                account.updated_at = now;

                accounts.insert(key, encode_tx(&account)?)?;
                Ok(Transition::Applied(account))
            });

        settle(result)
    }

    /// Accept an account in `final_validation` and credit its reward to the
    /// owner's balance in the same transaction. Replays are skipped, so the
    /// reward is credited at most once.
    pub fn accept_and_credit(
        &self,
        id: &str,
        audit: FinalAudit,
        now: u64,
    ) -> Result<Transition, PipelineError> {
        let key = id.as_bytes();
        let result: TransactionResult<Transition, PipelineError> =
            (&self.accounts, &self.balances).transaction(|(accounts, balances)| {
                let raw = accounts
                    .get(key)?
                    .ok_or_else(|| abort_with(PipelineError::NotFound))?;
                let mut account: Account = decode_tx(&raw)?;
                if account.status != AccountStatus::FinalValidation {
                    return Ok(Transition::Skipped(account));
                }

                let owner = account.owner_user_id.as_bytes();
                let current = match balances.get(owner)? {
                    Some(raw) => decode_tx::<u64>(&raw)?,
                    None => 0,
                };
                let credited = current.checked_add(account.reward_amount).ok_or_else(|| {
                    abort_with(PipelineError::InvalidState("balance overflow".to_string()))
                })?;
                balances.insert(owner, encode_tx(&credited)?)?;

                account.status = AccountStatus::Accepted;
                account.accepted_at = Some(now);
                account.final_session_count = audit.session_count;
                if audit.session_count.is_some() {
                    account.last_audit_at = Some(now);
                }
                account.devices_logged_out += audit.logged_out;
                account.updated_at = now;
                account.clear_secrets();

                accounts.insert(key, encode_tx(&account)?)?;
                Ok(Transition::Applied(account))
            });

        let outcome = settle(result)?;
        if let Transition::Applied(account) = &outcome {
            info!(
                "✅ Account {} accepted, credited {} to user {}",
                account.id, account.reward_amount, account.owner_user_id
            );
        }
        Ok(outcome)
    }

    pub fn balance(&self, user: &UserId) -> Result<u64, PipelineError> {
        match self.balances.get(user.as_bytes())? {
            Some(raw) => Ok(decode(&raw)?),
            None => Ok(0),
        }
    }

    /// Sealed operator passphrase installed on an account. Only the vault tree
    /// holds it once the takeover completed.
    pub fn operator_passphrase(&self, id: &AccountId) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.vault.get(id.as_bytes())?.map(|v| v.to_vec()))
    }

    pub fn get_country(&self, code: &str) -> Result<Option<CountryPolicy>, PipelineError> {
        Ok(storage::get(&self.countries, phone::digits(code))?)
    }

    pub fn list_countries(&self) -> Result<Vec<CountryPolicy>, PipelineError> {
        let mut countries: Vec<CountryPolicy> = storage::scan(&self.countries, |_| true)?;
        countries.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(countries)
    }

    /// Longest-prefix match (4, 3, 2, 1 digits); first hit wins.
    pub fn resolve_country(&self, phone_number: &str) -> Result<Option<CountryPolicy>, PipelineError> {
        for prefix in phone::prefix_candidates(phone_number) {
            if let Some(policy) = self.get_country(prefix)? {
                return Ok(Some(policy));
            }
        }
        Ok(None)
    }

    /// Insert or replace a country policy. `used_capacity` of an existing
    /// policy is preserved; the caller's value only seeds new entries.
    pub fn upsert_country(&self, policy: &CountryPolicy) -> Result<CountryPolicy, PipelineError> {
        let mut policy = policy.clone();
        policy.code = phone::digits(&policy.code).to_string();
        if policy.code.is_empty()
            || policy.code.len() > phone::MAX_PREFIX_DIGITS
            || !policy.code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PipelineError::InvalidInput(format!(
                "country code '{}' must be 1-{} digits",
                policy.code,
                phone::MAX_PREFIX_DIGITS
            )));
        }

        let key = policy.code.clone();
        let result: TransactionResult<CountryPolicy, PipelineError> = self.countries.transaction(|tx| {
            let mut next = policy.clone();
            if let Some(raw) = tx.get(key.as_bytes())? {
                let existing: CountryPolicy = decode_tx(&raw)?;
                next.used_capacity = existing.used_capacity;
            }
            tx.insert(key.as_bytes(), encode_tx(&next)?)?;
            Ok(next)
        });

        settle(result)
    }
}

fn abort_with(err: PipelineError) -> ConflictableTransactionError<PipelineError> {
    ConflictableTransactionError::Abort(err)
}

fn decode_tx<T: serde::de::DeserializeOwned>(
    raw: &[u8],
) -> ConflictableTransactionResult<T, PipelineError> {
    decode(raw).map_err(|e| abort_with(e.into()))
}

fn encode_tx<T: serde::Serialize>(value: &T) -> ConflictableTransactionResult<Vec<u8>, PipelineError> {
    encode(value).map_err(|e| abort_with(e.into()))
}

fn settle<T>(result: TransactionResult<T, PipelineError>) -> Result<T, PipelineError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}
