//! Structured audit log line on every OAuth-relevant decision. Per
//! SPEC_FULL.md §2, this is a `tracing` event, not a persisted store — no
//! state survives a restart, matching spec.md's non-goal on persistence.

use serde::Serialize;

/// OAuth- and session-relevant events worth a dedicated audit line, distinct
/// from ordinary request-level `debug!`/`info!` logging.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent<'a> {
    ClientRegistered { client_id: &'a str },
    AuthorizationCodeIssued { client_id: &'a str },
    AuthorizationCodeConsumed { client_id: &'a str, outcome: &'a str },
    AccessTokenIssued { client_id: &'a str },
    RefreshTokenRotated { client_id: &'a str },
    AllowlistDenied { federated_user: &'a str },
    SessionCreated { session_id: &'a str },
    SessionExpired { session_id: &'a str },
    SessionTerminated { session_id: &'a str },
    CommitPushed { description_count: usize },
    CommitFailed { reason: &'a str },
}

/// Emit the given event as a single structured `tracing::info!` line,
/// tagged `AUDIT` the way the teacher's `TracingSink` does.
pub fn record(event: &AuditEvent<'_>) {
    tracing::info!(event = ?event, "AUDIT");
}
