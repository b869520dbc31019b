//! Startup seeding of the system roles.

use std::collections::BTreeSet;
use std::sync::Arc;

use sentinel_core::error::SentinelResult;
use sentinel_core::models::role::{CreateRole, Role, UpdateRole};
use sentinel_core::repository::RoleRepository;
use tracing::{info, warn};

use crate::catalog::{PermissionCatalog, SystemRoleDef};

/// A catalog whose system roles are known to exist in the role store.
///
/// Only [`seed_catalog`] can produce one, so a resolver can never be
/// built against an unseeded store.
#[derive(Debug, Clone)]
pub struct SeededCatalog {
    catalog: Arc<PermissionCatalog>,
}

impl SeededCatalog {
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub(crate) fn shared(&self) -> Arc<PermissionCatalog> {
        Arc::clone(&self.catalog)
    }
}

/// Ensure every system role exists with exactly its defined permissions.
///
/// Missing roles are created. Drifted permission sets or system flags are
/// corrected in place. Roles outside the catalog are left alone.
pub async fn seed_catalog<R: RoleRepository>(
    catalog: PermissionCatalog,
    roles: &R,
) -> SentinelResult<SeededCatalog> {
    catalog.validate()?;

    let mut created = 0usize;
    let mut corrected = 0usize;

    for def in catalog.system_roles() {
        match roles.find_by_name(&def.name).await {
            Ok(existing) => {
                if let Some(update) = drift(&existing, def) {
                    warn!(role = %def.name, "system role drifted, correcting");
                    roles.update(existing.id, update).await?;
                    corrected += 1;
                }
            }
            Err(e) if e.is_not_found() => {
                roles
                    .create(CreateRole {
                        name: def.name.clone(),
                        description: def.description.clone(),
                        is_system: true,
                        permissions: def.permissions.clone(),
                    })
                    .await?;
                created += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        permissions = catalog.permissions().len(),
        system_roles = catalog.system_roles().len(),
        created,
        corrected,
        "permission catalog seeded"
    );

    Ok(SeededCatalog {
        catalog: Arc::new(catalog),
    })
}

fn drift(existing: &Role, def: &SystemRoleDef) -> Option<UpdateRole> {
    let have: BTreeSet<&str> = existing.permissions.iter().map(String::as_str).collect();
    let want: BTreeSet<&str> = def.permissions.iter().map(String::as_str).collect();

    let permissions_drifted = have != want;
    if !permissions_drifted && existing.is_system {
        return None;
    }

    Some(UpdateRole {
        permissions: permissions_drifted.then(|| def.permissions.clone()),
        is_system: (!existing.is_system).then_some(true),
        ..Default::default()
    })
}
