//! Sentinel Authorization: the closed permission catalog, system-role
//! seeding, the permission resolver and role management.

pub mod catalog;
pub mod resolver;
pub mod roles;
pub mod seed;

pub use catalog::{ADMIN_ROLE, PermissionCatalog, PermissionDef, SystemRoleDef};
pub use resolver::PermissionResolver;
pub use roles::RoleManager;
pub use seed::{SeededCatalog, seed_catalog};
