//! Per-session streaming transports, isolated tool handlers, and the vault
//! tool bodies they dispatch to.

pub mod manager;
pub mod tools;
pub mod transport;

pub use manager::{SessionError, TransportSession, TransportSessionManager, SESSION_HEADER};
pub use transport::router as session_router;
