//! Rate limiting, path confinement, and audit logging shared across the
//! vaultgate workspace.
//!
//! - [`rate_limit`] — C1, sliding... fixed-window per-key admission.
//! - [`path`] — C2, vault-root path confinement (lexical + symlink-safe).
//! - [`audit`] — structured `tracing` audit events for OAuth-relevant
//!   decisions.

pub mod audit;
pub mod path;
pub mod rate_limit;

pub use audit::{record as record_audit_event, AuditEvent};
pub use path::{
    resolve_within_vault, resolve_within_vault_safe, PathValidationError, DEFAULT_FORBIDDEN_DIRS,
};
pub use rate_limit::{Admission, RateLimiter};
