// JSON-RPC 2.0 adapter to the provider bridge process
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{
    ClientError, CodeRequest, DeviceSession, MessagingClient, PassphraseState, RedeemOutcome,
};

/// Bridge error code reserved for network/timeout failures on its side.
const TRANSIENT_CODE: i64 = -32000;

pub struct BridgeClient {
    url: String,
    client: Client,
    request_id: AtomicU64,
}

#[derive(Deserialize)]
struct FinalToken {
    final_token: String,
}

#[derive(Deserialize)]
struct Sessions {
    sessions: Vec<DeviceSession>,
}

impl BridgeClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Protocol(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            url,
            client,
            request_id: AtomicU64::new(1),
        })
    }

    async fn send_request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        debug!("Bridge request: method={}, id={}", method, id);

        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::Transient(format!("{} failed: {}", method, e)))?;

        if response.status().is_server_error() {
            return Err(ClientError::Transient(format!(
                "{} failed: HTTP {}",
                method,
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Protocol(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = body.get("error") {
            let message = error["message"].as_str().unwrap_or("Unknown error").to_string();
            let code = error["code"].as_i64().unwrap_or_default();
            if code == TRANSIENT_CODE {
                return Err(ClientError::Transient(message));
            }
            let reason = error["data"]["reason"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| code.to_string());
            return Err(ClientError::Rejected {
                code: reason,
                message,
            });
        }

        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| ClientError::Protocol(format!("{}: missing result", method)))?;
        serde_json::from_value(result)
            .map_err(|e| ClientError::Protocol(format!("{}: unexpected result: {}", method, e)))
    }

    async fn send_ack(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let _: Value = self.send_request(method, params).await?;
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for BridgeClient {
    async fn request_code(&self, phone_number: &str) -> Result<CodeRequest, ClientError> {
        self.send_request("requestCode", json!({ "phone_number": phone_number }))
            .await
    }

    async fn redeem_code(
        &self,
        interim_token: &str,
        correlation_handle: &str,
        code: &str,
    ) -> Result<RedeemOutcome, ClientError> {
        self.send_request(
            "redeemCode",
            json!({
                "interim_token": interim_token,
                "correlation_handle": correlation_handle,
                "code": code,
            }),
        )
        .await
    }

    async fn verify_secondary_passphrase(
        &self,
        interim_token: &str,
        passphrase: &str,
    ) -> Result<String, ClientError> {
        let token: FinalToken = self
            .send_request(
                "verifySecondaryPassphrase",
                json!({ "interim_token": interim_token, "passphrase": passphrase }),
            )
            .await?;
        Ok(token.final_token)
    }

    async fn passphrase_state(&self, token: &str) -> Result<PassphraseState, ClientError> {
        self.send_request("getPassphraseState", json!({ "token": token }))
            .await
    }

    async fn disable_passphrase(&self, token: &str, current: &str) -> Result<(), ClientError> {
        self.send_ack(
            "disablePassphrase",
            json!({ "token": token, "current_passphrase": current }),
        )
        .await
    }

    async fn set_or_change_passphrase(
        &self,
        token: &str,
        new_passphrase: &str,
        current: Option<&str>,
    ) -> Result<(), ClientError> {
        self.send_ack(
            "setOrChangePassphrase",
            json!({
                "token": token,
                "new_passphrase": new_passphrase,
                "current_passphrase": current,
            }),
        )
        .await
    }

    async fn list_active_sessions(&self, token: &str) -> Result<Vec<DeviceSession>, ClientError> {
        let sessions: Sessions = self
            .send_request("listActiveSessions", json!({ "token": token }))
            .await?;
        Ok(sessions.sessions)
    }

    async fn terminate_session(&self, token: &str, handle: &str) -> Result<(), ClientError> {
        self.send_ack("terminateSession", json!({ "token": token, "handle": handle }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: String) -> BridgeClient {
        BridgeClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_request_code_parses_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "requestCode",
                "params": { "phone_number": "+19995550001" },
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"correlation_handle":"h1","interim_token":"t1"}}"#)
            .create_async()
            .await;

        let request = client(server.url()).request_code("+19995550001").await.unwrap();
        assert_eq!(request.correlation_handle, "h1");
        assert_eq!(request.interim_token, "t1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_redeem_code_passphrase_required() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"status":"passphrase_required","interim_token":"t2"}}"#)
            .create_async()
            .await;

        let outcome = client(server.url()).redeem_code("t1", "h1", "12345").await.unwrap();
        assert_eq!(
            outcome,
            RedeemOutcome::PassphraseRequired { interim_token: "t2".to_string() }
        );
    }

    #[tokio::test]
    async fn test_error_codes_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({ "method": "redeemCode" })))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32010,"message":"code invalid","data":{"reason":"PHONE_CODE_INVALID"}}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({ "method": "listActiveSessions" })))
            .with_body(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"upstream timeout"}}"#)
            .create_async()
            .await;

        let bridge = client(server.url());
        let rejected = bridge.redeem_code("t1", "h1", "00000").await.unwrap_err();
        assert_eq!(rejected, ClientError::rejected("PHONE_CODE_INVALID", "code invalid"));

        let transient = bridge.list_active_sessions("tok").await.unwrap_err();
        assert!(transient.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_transient_and_garbage_is_protocol() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({ "method": "terminateSession" })))
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({ "method": "getPassphraseState" })))
            .with_body("not json")
            .create_async()
            .await;

        let bridge = client(server.url());
        assert!(bridge.terminate_session("tok", "s2").await.unwrap_err().is_transient());
        assert!(matches!(
            bridge.passphrase_state("tok").await.unwrap_err(),
            ClientError::Protocol(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_transient() {
        let bridge = client("http://127.0.0.1:9".to_string());
        assert!(bridge.request_code("+19995550001").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"sessions":[{"handle":"s1","current":true,"device":"Pixel","last_active":5},{"handle":"s2","current":false}]}}"#)
            .create_async()
            .await;

        let sessions = client(server.url()).list_active_sessions("tok").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].current);
        assert_eq!(sessions[1].device, "");
    }
}
