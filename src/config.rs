use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::account::types::CountryPolicy;
use crate::error::ConfigError;

const PASSPHRASE_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
const MIN_PASSPHRASE_LEN: usize = 8;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntakeConfig {
    pub node: NodeConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub countries: Vec<CountrySeed>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    pub rpc_port: u16,
    pub db_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub bridge_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            bridge_url: "http://127.0.0.1:8710".to_string(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub code_length: usize,
    pub max_verification_attempts: u32,
    pub default_wait_minutes: u64,
    pub min_account_age_minutes: u64,
    pub claim_lease_minutes: u64,
    /// 0 disables the in-process sweep loop.
    pub sweep_interval_secs: u64,
    pub operator_passphrase: OperatorPassphrase,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            code_length: 5,
            max_verification_attempts: 5,
            default_wait_minutes: 1440,
            min_account_age_minutes: 30,
            claim_lease_minutes: 15,
            sweep_interval_secs: 300,
            operator_passphrase: OperatorPassphrase::Random { length: 16 },
        }
    }
}

/// Secondary passphrase installed on every taken-over account.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OperatorPassphrase {
    Random { length: usize },
    Master { value: String },
}

impl OperatorPassphrase {
    pub fn next(&self) -> String {
        match self {
            OperatorPassphrase::Random { length } => random_passphrase(*length),
            OperatorPassphrase::Master { value } => value.clone(),
        }
    }
}

pub fn random_passphrase(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| PASSPHRASE_CHARSET[rng.gen_range(0..PASSPHRASE_CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SecurityConfig {
    pub vault_secret: String,
    /// Argon2 PHC string; admin RPC methods are refused while unset.
    #[serde(default)]
    pub admin_token_hash: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CountrySeed {
    pub code: String,
    pub name: String,
    pub max_capacity: u32,
    pub reward_amount: u64,
    pub wait_minutes: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CountrySeed {
    pub fn to_policy(&self) -> CountryPolicy {
        CountryPolicy {
            code: self.code.clone(),
            name: self.name.clone(),
            max_capacity: self.max_capacity,
            used_capacity: 0,
            reward_amount: self.reward_amount,
            wait_minutes: self.wait_minutes,
            active: self.active,
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                rpc_port: 9100,
                db_path: "./data/intake".to_string(),
                log_level: "info".to_string(),
            },
            provider: ProviderConfig::default(),
            pipeline: PipelineConfig::default(),
            security: SecurityConfig::default(),
            countries: vec![],
        }
    }
}

impl IntakeConfig {
    /// Read `path`, or write a fresh default (with a generated vault secret)
    /// when it does not exist yet. Returns the config and whether it was created.
    pub fn load_or_default(path: &str) -> Result<(Self, bool), ConfigError> {
        if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&raw)?;
            config.validate()?;
            Ok((config, false))
        } else {
            let mut config = Self::default();
            config.security.vault_secret = hex::encode(rand::random::<[u8; 32]>());
            std::fs::write(path, toml::to_string_pretty(&config)?)?;
            Ok((config, true))
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.vault_secret.is_empty() {
            return Err(ConfigError::Invalid("security.vault_secret must be set".into()));
        }
        if self.pipeline.code_length == 0 {
            return Err(ConfigError::Invalid("pipeline.code_length must be positive".into()));
        }
        if self.pipeline.max_verification_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_verification_attempts must be positive".into(),
            ));
        }
        match &self.pipeline.operator_passphrase {
            OperatorPassphrase::Random { length } if *length < MIN_PASSPHRASE_LEN => {
                return Err(ConfigError::Invalid(format!(
                    "operator passphrase length must be at least {}",
                    MIN_PASSPHRASE_LEN
                )));
            }
            OperatorPassphrase::Master { value } if value.len() < MIN_PASSPHRASE_LEN => {
                return Err(ConfigError::Invalid(format!(
                    "master operator passphrase must be at least {} characters",
                    MIN_PASSPHRASE_LEN
                )));
            }
            _ => {}
        }
        Ok(())
    }
}
