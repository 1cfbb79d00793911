pub mod handlers;
pub mod types;

use axum::{routing::post, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::pipeline::IntakeService;

#[derive(Clone)]
pub struct RpcState {
    pub service: Arc<IntakeService>,
    /// Argon2 hash guarding the admin methods; `None` refuses them all.
    pub admin_token_hash: Option<String>,
}

pub fn router(state: RpcState) -> Router {
    Router::new()
        .route("/", post(handlers::handle_rpc_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct RpcServer {
    state: RpcState,
    bind_addr: String,
}

impl RpcServer {
    pub fn new(service: Arc<IntakeService>, admin_token_hash: Option<String>, port: u16) -> Self {
        Self {
            state: RpcState {
                service,
                admin_token_hash,
            },
            bind_addr: format!("0.0.0.0:{}", port),
        }
    }

    pub async fn start(self) -> std::io::Result<()> {
        let app = router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;

        info!("🌐 RPC server listening on {}", self.bind_addr);
        axum::serve(listener, app).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::auth::hash_token;
    use crate::account::{AccountStore, PassphraseVault};
    use crate::client::mock::{ScriptedClient, VALID_CODE};
    use crate::config::PipelineConfig;
    use crate::storage::Storage;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state() -> RpcState {
        let store = Arc::new(AccountStore::new(Arc::new(Storage::temporary().unwrap())).unwrap());
        let vault = Arc::new(PassphraseVault::new("test-secret").unwrap());
        let service = IntakeService::new(
            store,
            Arc::new(ScriptedClient::new()),
            vault,
            &PipelineConfig::default(),
        );
        RpcState {
            service: Arc::new(service),
            admin_token_hash: Some(hash_token("admin-secret").unwrap()),
        }
    }

    async fn call(app: &Router, method: &str, params: Value) -> Value {
        let body = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 7 });
        let response = app
            .clone()
            .oneshot(
                Request::post("/")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_country_admin_then_submission() {
        let app = router(state());

        let denied = call(
            &app,
            "upsertCountry",
            json!({ "admin_token": "guess", "code": "1999", "name": "Testland",
                    "max_capacity": 1, "reward_amount": 10, "wait_minutes": 60 }),
        )
        .await;
        assert_eq!(denied["error"]["code"], -32004);

        let saved = call(
            &app,
            "upsertCountry",
            json!({ "admin_token": "admin-secret", "code": "+1999", "name": "Testland",
                    "max_capacity": 1, "reward_amount": 10, "wait_minutes": 60 }),
        )
        .await;
        assert_eq!(saved["result"]["code"], "1999");

        let submitted = call(
            &app,
            "submitPhone",
            json!({ "user_id": "u1", "phone_number": "+19995550001" }),
        )
        .await;
        assert_eq!(submitted["id"], 7);
        assert_eq!(submitted["result"]["status"], "awaiting_otp");
        assert_eq!(submitted["result"]["awaiting"], "code");
        let account_id = submitted["result"]["id"].as_str().unwrap().to_string();

        let full = call(
            &app,
            "submitPhone",
            json!({ "user_id": "u1", "phone_number": "+19995550002" }),
        )
        .await;
        assert_eq!(full["error"]["code"], -32001);

        let queued = call(
            &app,
            "submitCode",
            json!({ "user_id": "u1", "account_id": account_id, "code": VALID_CODE }),
        )
        .await;
        assert_eq!(queued["result"]["status"], "pending_review");
        assert!(queued["result"].get("session_token").is_none());

        let locked = call(
            &app,
            "getOperatorPassphrase",
            json!({ "admin_token": "admin-secret", "account_id": account_id }),
        )
        .await;
        assert_eq!(locked["error"]["code"], -32003);
        let denied = call(
            &app,
            "getOperatorPassphrase",
            json!({ "admin_token": "guess", "account_id": account_id }),
        )
        .await;
        assert_eq!(denied["error"]["code"], -32004);

        let pending = call(&app, "listPending", json!({ "admin_token": "admin-secret" })).await;
        assert_eq!(pending["result"].as_array().unwrap().len(), 1);

        let sweep = call(&app, "processReadyAccounts", json!({ "admin_token": "admin-secret" })).await;
        assert_eq!(sweep["result"]["examined"], 0);

        let balance = call(&app, "getBalance", json!({ "user_id": "u1" })).await;
        assert_eq!(balance["result"]["balance"], 0);
    }

    #[tokio::test]
    async fn test_errors_are_classified() {
        let app = router(state());

        let unknown = call(&app, "mintTokens", json!({})).await;
        assert_eq!(unknown["error"]["code"], -32601);

        let bad_params = call(&app, "submitPhone", json!({ "user_id": "u1" })).await;
        assert_eq!(bad_params["error"]["code"], -32602);

        let bad_phone = call(
            &app,
            "submitPhone",
            json!({ "user_id": "u1", "phone_number": "not a number" }),
        )
        .await;
        assert_eq!(bad_phone["error"]["code"], -32602);

        let missing = call(&app, "getStatus", json!({ "user_id": "u1", "account_id": "nope" })).await;
        assert_eq!(missing["error"]["code"], -32003);

        let version = call(&app, "getVersion", Value::Null).await;
        assert_eq!(version["result"]["name"], "rust_intake");
    }
}
