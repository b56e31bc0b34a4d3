//! Debounced commit coordination and a hardened `git` subprocess wrapper for
//! the vault's working tree.

pub mod coordinator;
pub mod subprocess;

pub use coordinator::{CoordinatorConfig, DebouncedCommitCoordinator};
pub use subprocess::{redact_credentials, run, sanitize_commit_message, CommandOutput, VcsError};
