//! Scripted in-memory provider used by the pipeline tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use super::{
    ClientError, CodeRequest, DeviceSession, MessagingClient, PassphraseState, RedeemOutcome,
};

pub const VALID_CODE: &str = "12345";
pub const HANDLE: &str = "hash-1";
pub const INTERIM: &str = "interim-1";
pub const INTERIM_2FA: &str = "interim-2fa";
pub const FINAL_TOKEN: &str = "final-token";

#[derive(Default)]
struct Script {
    passphrase: Option<String>,
    sessions: Vec<DeviceSession>,
    failing_terminations: HashSet<String>,
    request_code_error: Option<ClientError>,
    enumerate_failures: u32,
    enumerate_fail_on: Option<usize>,
    disable_error: Option<ClientError>,
    set_error: Option<ClientError>,
    calls: Vec<String>,
}

pub struct ScriptedClient {
    script: Mutex<Script>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    /// One device (the operator's), no passphrase.
    pub fn new() -> Self {
        let client = Self {
            script: Mutex::new(Script::default()),
        };
        client.with_sessions(1)
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn with_passphrase(self, passphrase: &str) -> Self {
        self.script().passphrase = Some(passphrase.to_string());
        self
    }

    /// `count` sessions; the first one is the caller's own.
    pub fn with_sessions(self, count: usize) -> Self {
        self.script().sessions = (0..count)
            .map(|i| DeviceSession {
                handle: format!("s{}", i + 1),
                current: i == 0,
                device: format!("device-{}", i + 1),
                last_active: i as u64,
            })
            .collect();
        self
    }

    pub fn with_sessions_list(self, sessions: Vec<DeviceSession>) -> Self {
        self.script().sessions = sessions;
        self
    }

    pub fn failing_termination(self, handle: &str) -> Self {
        self.script().failing_terminations.insert(handle.to_string());
        self
    }

    pub fn failing_request_code(self, err: ClientError) -> Self {
        self.script().request_code_error = Some(err);
        self
    }

    /// The next `n` enumerations fail.
    pub fn failing_enumerations(self, n: u32) -> Self {
        self.script().enumerate_failures = n;
        self
    }

    /// Only the `n`-th enumeration (1-based) fails.
    pub fn failing_enumeration_call(self, n: usize) -> Self {
        self.script().enumerate_fail_on = Some(n);
        self
    }

    pub fn failing_disable(self, err: ClientError) -> Self {
        self.script().disable_error = Some(err);
        self
    }

    pub fn failing_set(self, err: ClientError) -> Self {
        self.script().set_error = Some(err);
        self
    }

    pub fn set_failing_enumerations(&self, n: u32) {
        self.script().enumerate_failures = n;
    }

    pub fn add_session(&self, handle: &str) {
        self.script().sessions.push(DeviceSession {
            handle: handle.to_string(),
            current: false,
            device: "late-device".to_string(),
            last_active: 0,
        });
    }

    pub fn passphrase(&self) -> Option<String> {
        self.script().passphrase.clone()
    }

    pub fn session_count(&self) -> usize {
        self.script().sessions.len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.script().calls.iter().filter(|c| c.as_str() == name).count()
    }

    fn check_passphrase(script: &Script, given: Option<&str>) -> Result<(), ClientError> {
        match (&script.passphrase, given) {
            (None, _) => Ok(()),
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(ClientError::rejected("PASSWORD_HASH_INVALID", "wrong passphrase")),
        }
    }
}

#[async_trait]
impl MessagingClient for ScriptedClient {
    async fn request_code(&self, _phone_number: &str) -> Result<CodeRequest, ClientError> {
        let mut script = self.script();
        script.calls.push("request_code".into());
        if let Some(err) = script.request_code_error.clone() {
            return Err(err);
        }
        Ok(CodeRequest {
            correlation_handle: HANDLE.to_string(),
            interim_token: INTERIM.to_string(),
        })
    }

    async fn redeem_code(
        &self,
        interim_token: &str,
        correlation_handle: &str,
        code: &str,
    ) -> Result<RedeemOutcome, ClientError> {
        let mut script = self.script();
        script.calls.push("redeem_code".into());
        if interim_token != INTERIM || correlation_handle != HANDLE {
            return Err(ClientError::rejected("PHONE_CODE_EXPIRED", "stale handle"));
        }
        if code != VALID_CODE {
            return Err(ClientError::rejected("PHONE_CODE_INVALID", "invalid code"));
        }
        if script.passphrase.is_some() {
            Ok(RedeemOutcome::PassphraseRequired {
                interim_token: INTERIM_2FA.to_string(),
            })
        } else {
            Ok(RedeemOutcome::Authenticated {
                final_token: FINAL_TOKEN.to_string(),
            })
        }
    }

    async fn verify_secondary_passphrase(
        &self,
        interim_token: &str,
        passphrase: &str,
    ) -> Result<String, ClientError> {
        let mut script = self.script();
        script.calls.push("verify_secondary_passphrase".into());
        if interim_token != INTERIM_2FA {
            return Err(ClientError::rejected("AUTH_KEY_UNREGISTERED", "stale interim token"));
        }
        Self::check_passphrase(&script, Some(passphrase))?;
        Ok(FINAL_TOKEN.to_string())
    }

    async fn passphrase_state(&self, _token: &str) -> Result<PassphraseState, ClientError> {
        let mut script = self.script();
        script.calls.push("passphrase_state".into());
        Ok(PassphraseState {
            has_passphrase: script.passphrase.is_some(),
        })
    }

    async fn disable_passphrase(&self, _token: &str, current: &str) -> Result<(), ClientError> {
        let mut script = self.script();
        script.calls.push("disable_passphrase".into());
        if let Some(err) = script.disable_error.clone() {
            return Err(err);
        }
        Self::check_passphrase(&script, Some(current))?;
        script.passphrase = None;
        Ok(())
    }

    async fn set_or_change_passphrase(
        &self,
        _token: &str,
        new_passphrase: &str,
        current: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut script = self.script();
        script.calls.push("set_or_change_passphrase".into());
        if let Some(err) = script.set_error.clone() {
            return Err(err);
        }
        Self::check_passphrase(&script, current)?;
        script.passphrase = Some(new_passphrase.to_string());
        Ok(())
    }

    async fn list_active_sessions(&self, _token: &str) -> Result<Vec<DeviceSession>, ClientError> {
        let mut script = self.script();
        script.calls.push("list_active_sessions".into());
        let call = script.calls.iter().filter(|c| c.as_str() == "list_active_sessions").count();
        if script.enumerate_fail_on == Some(call) {
            return Err(ClientError::Transient("enumeration timed out".into()));
        }
        if script.enumerate_failures > 0 {
            script.enumerate_failures -= 1;
            return Err(ClientError::Transient("enumeration timed out".into()));
        }
        Ok(script.sessions.clone())
    }

    async fn terminate_session(&self, _token: &str, handle: &str) -> Result<(), ClientError> {
        let mut script = self.script();
        script.calls.push("terminate_session".into());
        if script.failing_terminations.contains(handle) {
            return Err(ClientError::rejected("FRESH_RESET_AUTHORISATION_FORBIDDEN", "too new"));
        }
        script.sessions.retain(|s| s.handle != handle);
        Ok(())
    }
}
