//! Authentication error types.

use sentinel_core::error::{FieldError, SentinelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password does not meet policy")]
    WeakPassword(Vec<FieldError>),

    #[error("session store is shut down")]
    StoreClosed,

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for SentinelError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::WeakPassword(errors) => SentinelError::Validation { errors },
            AuthError::StoreClosed => SentinelError::Internal(err.to_string()),
            AuthError::Crypto(msg) => SentinelError::Crypto(msg),
        }
    }
}
