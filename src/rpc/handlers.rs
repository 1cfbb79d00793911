use super::types::*;
use crate::account::auth::verify_token;
use crate::account::CountryPolicy;
use crate::error::PipelineError;
use crate::rpc::RpcState;
use axum::{debug_handler, extract::State, Json};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

/// Main dispatcher: routes incoming JSON-RPC requests to the correct handler.
#[debug_handler]
pub async fn handle_rpc_request(
    State(state): State<RpcState>,
    Json(req): Json<RpcRequest>,
) -> Json<RpcResponse> {
    debug!("RPC Request: method={}, id={}", req.method, req.id);

    let result = match req.method.as_str() {
        // Stage triggers
        "submitPhone" => handle_submit_phone(&state, req.params).await,
        "submitCode" => handle_submit_code(&state, req.params).await,
        "submitSecondaryPassphrase" => handle_submit_secondary_passphrase(&state, req.params).await,
        "provideOwnerPassphrase" => handle_provide_owner_passphrase(&state, req.params).await,
        // Views
        "getStatus" => handle_get_status(&state, req.params),
        "listAccounts" => handle_list_accounts(&state, req.params),
        "getBalance" => handle_get_balance(&state, req.params),
        "getVersion" => handle_get_version(),
        // Admin
        "processReadyAccounts" => handle_process_ready_accounts(&state, req.params).await,
        "listPending" => handle_list_pending(&state, req.params),
        "rejectAccount" => handle_reject_account(&state, req.params),
        "upsertCountry" => handle_upsert_country(&state, req.params),
        "getOperatorPassphrase" => handle_get_operator_passphrase(&state, req.params),
        _ => Err(RpcError {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", req.method),
        }),
    };

    match result {
        Ok(val) => Json(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(val),
            error: None,
            id: req.id,
        }),
        Err(err) => Json(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(err),
            id: req.id,
        }),
    }
}

//
// === Helper Functions ===
//

fn parse_params<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError {
        code: INVALID_PARAMS,
        message: format!("Invalid params: {}", e),
    })
}

/// Safely serialize to JSON value
fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: INTERNAL_ERROR,
        message: format!("Serialization error: {}", e),
    })
}

fn require_admin(state: &RpcState, token: &str) -> Result<(), RpcError> {
    match &state.admin_token_hash {
        Some(hash) if verify_token(token, hash) => Ok(()),
        _ => Err(to_rpc_error(PipelineError::Unauthorized)),
    }
}

/// Stable error codes per failure class.
pub fn to_rpc_error(err: PipelineError) -> RpcError {
    let code = match &err {
        PipelineError::InvalidInput(_) => INVALID_PARAMS,
        PipelineError::NoCapacity(_)
        | PipelineError::CountryNotSupported
        | PipelineError::CountryInactive(_)
        | PipelineError::AlreadyClaimed => REFUSED,
        PipelineError::Provider(_) | PipelineError::EnumerationFailed(_) => PROVIDER_ERROR,
        PipelineError::WrongStage { .. }
        | PipelineError::OwnerPassphraseRequired
        | PipelineError::NotFound => WRONG_STAGE,
        PipelineError::Unauthorized => UNAUTHORIZED,
        PipelineError::InvalidState(_) | PipelineError::Storage(_) | PipelineError::Vault(_) => {
            error!("Internal pipeline error: {}", err);
            INTERNAL_ERROR
        }
    };
    RpcError {
        code,
        message: err.to_string(),
    }
}

//
// === Stage triggers ===
//

async fn handle_submit_phone(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: SubmitPhoneParams = parse_params(params)?;
    let view = state
        .service
        .submit_phone(&p.phone_number, &p.user_id)
        .await
        .map_err(to_rpc_error)?;
    to_json(&view)
}

async fn handle_submit_code(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: SubmitCodeParams = parse_params(params)?;
    let view = state
        .service
        .submit_code(&p.user_id, &p.account_id, &p.code)
        .await
        .map_err(to_rpc_error)?;
    to_json(&view)
}

async fn handle_submit_secondary_passphrase(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: PassphraseParams = parse_params(params)?;
    let view = state
        .service
        .submit_secondary_passphrase(&p.user_id, &p.account_id, &p.passphrase)
        .await
        .map_err(to_rpc_error)?;
    to_json(&view)
}

async fn handle_provide_owner_passphrase(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: PassphraseParams = parse_params(params)?;
    let view = state
        .service
        .provide_owner_passphrase(&p.user_id, &p.account_id, &p.passphrase)
        .await
        .map_err(to_rpc_error)?;
    to_json(&view)
}

//
// === Views ===
//

fn handle_get_status(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: AccountParams = parse_params(params)?;
    let view = state.service.status(&p.user_id, &p.account_id).map_err(to_rpc_error)?;
    to_json(&view)
}

fn handle_list_accounts(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: UserParams = parse_params(params)?;
    let views = state.service.list_accounts(&p.user_id).map_err(to_rpc_error)?;
    to_json(&views)
}

fn handle_get_balance(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: UserParams = parse_params(params)?;
    let balance = state.service.balance(&p.user_id).map_err(to_rpc_error)?;
    to_json(&BalanceResponse {
        user_id: p.user_id,
        balance,
    })
}

fn handle_get_version() -> Result<serde_json::Value, RpcError> {
    to_json(&VersionInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

//
// === Admin ===
//

async fn handle_process_ready_accounts(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AdminParams = parse_params(params)?;
    require_admin(state, &p.admin_token)?;
    let summary = state.service.process_ready_accounts().await.map_err(to_rpc_error)?;
    to_json(&summary)
}

fn handle_list_pending(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: AdminParams = parse_params(params)?;
    require_admin(state, &p.admin_token)?;
    let views = state.service.list_pending().map_err(to_rpc_error)?;
    to_json(&views)
}

fn handle_reject_account(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: RejectAccountParams = parse_params(params)?;
    require_admin(state, &p.admin_token)?;
    let view = state
        .service
        .reject_pending(&p.account_id, &p.reason)
        .map_err(to_rpc_error)?;
    to_json(&view)
}

fn handle_upsert_country(state: &RpcState, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let p: UpsertCountryParams = parse_params(params)?;
    require_admin(state, &p.admin_token)?;
    let saved = state
        .service
        .upsert_country(&CountryPolicy {
            code: p.code,
            name: p.name,
            max_capacity: p.max_capacity,
            used_capacity: 0,
            reward_amount: p.reward_amount,
            wait_minutes: p.wait_minutes,
            active: p.active,
        })
        .map_err(to_rpc_error)?;
    to_json(&saved)
}

fn handle_get_operator_passphrase(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AdminAccountParams = parse_params(params)?;
    require_admin(state, &p.admin_token)?;
    let passphrase = state
        .service
        .operator_passphrase(&p.account_id)
        .map_err(to_rpc_error)?;
    to_json(&OperatorPassphraseResponse {
        account_id: p.account_id,
        passphrase,
    })
}
