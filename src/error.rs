use thiserror::Error;

use crate::account::types::AccountStatus;
use crate::client::ClientError;

/// Failures of the embedded store (sled + bincode).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid key material")]
    InvalidKey,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Token hashing failed")]
    HashFailed,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No capacity available for country {0}")]
    NoCapacity(String),
    #[error("Country code not supported")]
    CountryNotSupported,
    #[error("Country {0} is not accepting new accounts")]
    CountryInactive(String),
    #[error("Phone number already claimed by another user")]
    AlreadyClaimed,
    #[error("Account not found")]
    NotFound,
    #[error("Account is {actual}, expected {expected}")]
    WrongStage {
        expected: AccountStatus,
        actual: AccountStatus,
    },
    #[error("Provider error: {0}")]
    Provider(#[from] ClientError),
    #[error("Account has a secondary passphrase; the current passphrase is required")]
    OwnerPassphraseRequired,
    #[error("Session enumeration failed: {0}")]
    EnumerationFailed(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

impl PipelineError {
    /// True when retrying the same call later may succeed without any change
    /// on the caller's side.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Provider(e) => e.is_transient(),
            PipelineError::EnumerationFailed(_) | PipelineError::Storage(_) => true,
            _ => false,
        }
    }
}

impl From<sled::Error> for PipelineError {
    fn from(err: sled::Error) -> Self {
        PipelineError::Storage(StorageError::Sled(err))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Start-up failures of the node process.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
