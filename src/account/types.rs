//! Account and country policy definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier (UUID v4)
pub type AccountId = String;

/// Owning platform user
pub type UserId = String;

pub const MINUTE_MS: u64 = 60_000;

/// Lifecycle of one submitted account.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Submitted,
    AwaitingOtp,
    AwaitingSecondaryPassphrase,
    CredentialTakeoverPending,
    SessionAuditPending,
    PendingReview,
    FinalValidation,
    Accepted,
    Rejected,
}

impl AccountStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AccountStatus::Accepted | AccountStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Submitted => "submitted",
            AccountStatus::AwaitingOtp => "awaiting_otp",
            AccountStatus::AwaitingSecondaryPassphrase => "awaiting_secondary_passphrase",
            AccountStatus::CredentialTakeoverPending => "credential_takeover_pending",
            AccountStatus::SessionAuditPending => "session_audit_pending",
            AccountStatus::PendingReview => "pending_review",
            AccountStatus::FinalValidation => "final_validation",
            AccountStatus::Accepted => "accepted",
            AccountStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted phone-linked account.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Account {
    // Identity
    pub id: AccountId,
    pub phone_number: String,
    pub owner_user_id: UserId,
    pub country_code: String,
    pub status: AccountStatus,

    // Authentication
    pub correlation_handle: Option<String>,
    pub interim_token: Option<String>,
    pub session_token: Option<String>,
    pub failed_attempts: u32,

    // Credentials (sealed with the passphrase vault, never plaintext)
    pub had_owner_passphrase: bool,
    pub owner_passphrase_sealed: Option<Vec<u8>>,
    pub operator_passphrase_set: bool,
    pub operator_passphrase_sealed: Option<Vec<u8>>,
    pub operator_passphrase_set_at: Option<u64>,

    // Session audit
    pub initial_session_count: Option<u32>,
    pub final_session_count: Option<u32>,
    pub devices_logged_out: u32,
    pub last_audit_at: Option<u64>,

    // Pending queue
    pub wait_minutes: u64,
    pub enqueued_at: Option<u64>,
    pub claimed_at: Option<u64>,
    /// Worker currently running the takeover or first audit.
    pub stage_claimed_at: Option<u64>,

    // Decision
    pub reward_amount: u64,
    pub rejection_reason: Option<String>,
    pub accepted_at: Option<u64>,
    pub rejected_at: Option<u64>,

    pub created_at: u64,
    pub updated_at: u64,
}

impl Account {
    pub fn new(
        id: AccountId,
        phone_number: String,
        owner_user_id: UserId,
        policy: &CountryPolicy,
        now: u64,
    ) -> Self {
        Self {
            id,
            phone_number,
            owner_user_id,
            country_code: policy.code.clone(),
            status: AccountStatus::Submitted,
            correlation_handle: None,
            interim_token: None,
            session_token: None,
            failed_attempts: 0,
            had_owner_passphrase: false,
            owner_passphrase_sealed: None,
            operator_passphrase_set: false,
            operator_passphrase_sealed: None,
            operator_passphrase_set_at: None,
            initial_session_count: None,
            final_session_count: None,
            devices_logged_out: 0,
            last_audit_at: None,
            wait_minutes: policy.wait_minutes,
            enqueued_at: None,
            claimed_at: None,
            stage_claimed_at: None,
            reward_amount: policy.reward_amount,
            rejection_reason: None,
            accepted_at: None,
            rejected_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// When the pending-review wait elapses, if the account is queued.
    pub fn ready_at(&self) -> Option<u64> {
        self.enqueued_at
            .map(|at| at.saturating_add(self.wait_minutes.saturating_mul(MINUTE_MS)))
    }

    pub fn is_ready(&self, now: u64) -> bool {
        self.status == AccountStatus::PendingReview
            && self.ready_at().is_some_and(|ready| now >= ready)
    }

    /// No worker holds the current stage, or its claim outlived `lease_ms`.
    pub fn stage_free(&self, now: u64, lease_ms: u64) -> bool {
        self.stage_claimed_at
            .map_or(true, |at| now >= at.saturating_add(lease_ms))
    }

    /// Drop every secret the record still carries.
    pub fn clear_secrets(&mut self) {
        self.owner_passphrase_sealed = None;
        self.operator_passphrase_sealed = None;
        self.interim_token = None;
        self.correlation_handle = None;
    }

    pub fn view(&self, now: u64) -> AccountView {
        let pending = self.status == AccountStatus::PendingReview;
        let ready_at = if pending { self.ready_at() } else { None };
        let minutes_remaining = ready_at.map(|ready| {
            let left = ready.saturating_sub(now);
            left.div_ceil(MINUTE_MS)
        });

        AccountView {
            id: self.id.clone(),
            phone_number: self.phone_number.clone(),
            status: self.status,
            country_code: self.country_code.clone(),
            reward_amount: self.reward_amount,
            awaiting: self.awaiting(),
            wait_minutes: self.wait_minutes,
            minutes_remaining,
            ready_at: ready_at.and_then(format_timestamp),
            initial_session_count: self.initial_session_count,
            final_session_count: self.final_session_count,
            devices_logged_out: self.devices_logged_out,
            rejection_reason: self.rejection_reason.clone(),
            created_at: format_timestamp(self.created_at),
            accepted_at: self.accepted_at.and_then(format_timestamp),
            rejected_at: self.rejected_at.and_then(format_timestamp),
        }
    }

    fn awaiting(&self) -> Option<Awaiting> {
        match self.status {
            AccountStatus::AwaitingOtp => Some(Awaiting::Code),
            AccountStatus::AwaitingSecondaryPassphrase => Some(Awaiting::SecondaryPassphrase),
            AccountStatus::CredentialTakeoverPending
                if self.had_owner_passphrase && self.owner_passphrase_sealed.is_none() =>
            {
                Some(Awaiting::OwnerPassphrase)
            }
            _ => None,
        }
    }
}

/// Input the pipeline is waiting on from the account owner.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Awaiting {
    Code,
    SecondaryPassphrase,
    OwnerPassphrase,
}

/// What the UI layer is allowed to see. Tokens and passphrases never leave
/// the store.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccountView {
    pub id: AccountId,
    pub phone_number: String,
    pub status: AccountStatus,
    pub country_code: String,
    pub reward_amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<Awaiting>,
    pub wait_minutes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<String>,
    pub initial_session_count: Option<u32>,
    pub final_session_count: Option<u32>,
    pub devices_logged_out: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<String>,
}

/// Capacity and timing per phone country-code prefix.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CountryPolicy {
    /// Dialling prefix, digits only (no leading `+`)
    pub code: String,
    pub name: String,
    pub max_capacity: u32,
    pub used_capacity: u32,
    pub reward_amount: u64,
    pub wait_minutes: u64,
    pub active: bool,
}

impl CountryPolicy {
    pub fn has_capacity(&self) -> bool {
        self.used_capacity < self.max_capacity
    }
}

pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn format_timestamp(ms: u64) -> Option<String> {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms as i64).map(|t| t.to_rfc3339())
}
