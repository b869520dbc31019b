//! Sentinel Auth: credential verification with brute-force lockout, the
//! in-memory session store and its background sweeper.

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod password;
pub mod service;
pub mod session;
pub mod token;

pub use audit::TracingAuditSink;
pub use config::{AuthConfig, SessionConfig};
pub use context::{current_session_id, with_current_session};
pub use error::AuthError;
pub use service::{Authenticator, LoginInput, LoginOutcome, RejectReason};
pub use session::SessionStore;
