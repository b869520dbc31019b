//! SurrealDB repository implementations.

mod audit;
mod role;
mod user;

pub use audit::SurrealAuditSink;
pub use role::SurrealRoleRepository;
pub use user::SurrealCredentialRepository;
