//! Sentinel Database: SurrealDB connection management, schema
//! migrations and the repository implementations backing the
//! `sentinel-core` collaborator traits.

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::run_migrations;
