//! Sentinel Core: domain models, error taxonomy, clock and the
//! collaborator traits shared by the authentication and authorization
//! crates.

pub mod clock;
pub mod error;
pub mod models;
pub mod repository;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{FieldError, SentinelError, SentinelResult};
