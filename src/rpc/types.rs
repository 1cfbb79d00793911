// RPC types for JSON-RPC 2.0 protocol
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: u64,
}

#[derive(Serialize, Debug)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

pub const INVALID_PARAMS: i32 = -32602;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INTERNAL_ERROR: i32 = -32603;
pub const REFUSED: i32 = -32001;
pub const PROVIDER_ERROR: i32 = -32002;
pub const WRONG_STAGE: i32 = -32003;
pub const UNAUTHORIZED: i32 = -32004;

// Method-specific parameter types
#[derive(Deserialize, Debug)]
pub struct SubmitPhoneParams {
    pub user_id: String,
    pub phone_number: String,
}

#[derive(Deserialize, Debug)]
pub struct SubmitCodeParams {
    pub user_id: String,
    pub account_id: String,
    pub code: String,
}

#[derive(Deserialize, Debug)]
pub struct PassphraseParams {
    pub user_id: String,
    pub account_id: String,
    pub passphrase: String,
}

#[derive(Deserialize, Debug)]
pub struct AccountParams {
    pub user_id: String,
    pub account_id: String,
}

#[derive(Deserialize, Debug)]
pub struct UserParams {
    pub user_id: String,
}

#[derive(Deserialize, Debug)]
pub struct AdminParams {
    pub admin_token: String,
}

#[derive(Deserialize, Debug)]
pub struct AdminAccountParams {
    pub admin_token: String,
    pub account_id: String,
}

#[derive(Deserialize, Debug)]
pub struct RejectAccountParams {
    pub admin_token: String,
    pub account_id: String,
    pub reason: String,
}

#[derive(Deserialize, Debug)]
pub struct UpsertCountryParams {
    pub admin_token: String,
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

#[derive(Serialize, Debug)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: u64,
}

#[derive(Serialize, Debug)]
pub struct OperatorPassphraseResponse {
    pub account_id: String,
    pub passphrase: String,
}

#[derive(Serialize, Debug)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
}
