// Messaging account client
pub mod bridge;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bridge::BridgeClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Network failure or timeout; the same call may be retried.
    #[error("Transient provider failure: {0}")]
    Transient(String),
    /// Authoritative refusal (invalid code, wrong passphrase, ...).
    #[error("Provider rejected request ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("Malformed provider response: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }

    pub fn rejected(code: &str, message: &str) -> Self {
        ClientError::Rejected {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CodeRequest {
    pub correlation_handle: String,
    pub interim_token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RedeemOutcome {
    Authenticated { final_token: String },
    PassphraseRequired { interim_token: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PassphraseState {
    pub has_passphrase: bool,
}

/// One active device login on the external account.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceSession {
    pub handle: String,
    pub current: bool,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub last_active: u64,
}

/// Operations consumed from the external account-management provider.
/// Every call is rehydrated from the token it is given; implementations keep
/// no per-account state between calls.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn request_code(&self, phone_number: &str) -> Result<CodeRequest, ClientError>;

    async fn redeem_code(
        &self,
        interim_token: &str,
        correlation_handle: &str,
        code: &str,
    ) -> Result<RedeemOutcome, ClientError>;

    /// Returns the finalized session token.
    async fn verify_secondary_passphrase(
        &self,
        interim_token: &str,
        passphrase: &str,
    ) -> Result<String, ClientError>;

    async fn passphrase_state(&self, token: &str) -> Result<PassphraseState, ClientError>;

    async fn disable_passphrase(&self, token: &str, current: &str) -> Result<(), ClientError>;

    async fn set_or_change_passphrase(
        &self,
        token: &str,
        new_passphrase: &str,
        current: Option<&str>,
    ) -> Result<(), ClientError>;

    async fn list_active_sessions(&self, token: &str) -> Result<Vec<DeviceSession>, ClientError>;

    async fn terminate_session(&self, token: &str, handle: &str) -> Result<(), ClientError>;
}
