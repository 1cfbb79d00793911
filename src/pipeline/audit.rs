use std::sync::Arc;
use tracing::{info, warn};

use crate::client::{DeviceSession, MessagingClient};
use crate::error::PipelineError;

/// Result of one audit pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditReport {
    /// Sessions seen before any termination.
    pub sessions_seen: u32,
    pub logged_out: u32,
    pub failed: u32,
}

impl AuditReport {
    /// Session count known without re-enumerating: only when nothing had to
    /// be terminated.
    pub fn settled_count(&self) -> Option<u32> {
        (self.sessions_seen <= 1).then_some(self.sessions_seen)
    }
}

/// Session Auditor. Never asserts single-device control by itself; callers
/// re-enumerate for a trustworthy count.
pub struct SessionAuditor {
    client: Arc<dyn MessagingClient>,
}

impl SessionAuditor {
    pub fn new(client: Arc<dyn MessagingClient>) -> Self {
        Self { client }
    }

    /// An empty list, or one without the caller's own session, cannot be
    /// trusted and counts as a failed enumeration.
    pub async fn enumerate(&self, token: &str) -> Result<Vec<DeviceSession>, PipelineError> {
        let sessions = self
            .client
            .list_active_sessions(token)
            .await
            .map_err(|e| PipelineError::EnumerationFailed(e.to_string()))?;

        if sessions.is_empty() {
            return Err(PipelineError::EnumerationFailed("no active sessions reported".into()));
        }
        if !sessions.iter().any(|s| s.current) {
            return Err(PipelineError::EnumerationFailed(
                "own session missing from active sessions".into(),
            ));
        }
        Ok(sessions)
    }

    pub async fn audit(&self, token: &str) -> Result<AuditReport, PipelineError> {
        let sessions = self.enumerate(token).await?;
        let mut report = AuditReport {
            sessions_seen: sessions.len() as u32,
            ..Default::default()
        };
        if sessions.len() > 1 {
            let (logged_out, failed) = self.terminate_others(token, &sessions).await;
            report.logged_out = logged_out;
            report.failed = failed;
        }
        Ok(report)
    }

    /// Best-effort: a failed termination is logged and the loop continues.
    /// Returns `(logged_out, failed)`.
    pub async fn terminate_others(&self, token: &str, sessions: &[DeviceSession]) -> (u32, u32) {
        let mut logged_out = 0;
        let mut failed = 0;
        for session in sessions.iter().filter(|s| !s.current) {
            match self.client.terminate_session(token, &session.handle).await {
                Ok(()) => {
                    logged_out += 1;
                    info!("🚪 Terminated session {} ({})", session.handle, session.device);
                }
                Err(e) => {
                    failed += 1;
                    warn!("Failed to terminate session {}: {}", session.handle, e);
                }
            }
        }
        (logged_out, failed)
    }
}
