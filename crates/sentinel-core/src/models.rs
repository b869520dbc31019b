//! Domain models shared across the Sentinel crates.

pub mod audit;
pub mod role;
pub mod session;
pub mod user;
