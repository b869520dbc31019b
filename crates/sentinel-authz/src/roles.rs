//! Role management for the administration screens.

use std::sync::Arc;

use sentinel_core::error::{FieldError, SentinelError, SentinelResult};
use sentinel_core::models::role::{CreateRole, Role, UpdateRole, role_key};
use sentinel_core::repository::RoleRepository;
use tracing::info;

use crate::catalog::PermissionCatalog;
use crate::seed::SeededCatalog;

pub const MAX_ROLE_NAME_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 256;

pub struct RoleManager<R> {
    catalog: Arc<PermissionCatalog>,
    roles: R,
}

impl<R: RoleRepository> RoleManager<R> {
    pub fn new(seeded: &SeededCatalog, roles: R) -> Self {
        Self {
            catalog: seeded.shared(),
            roles,
        }
    }

    pub async fn list_roles(&self) -> SentinelResult<Vec<Role>> {
        self.roles.list_all().await
    }

    /// Create a custom (non-system) role.
    pub async fn create_role(&self, input: CreateRole) -> SentinelResult<Role> {
        let mut errors = Vec::new();
        validate_name(&input.name, &mut errors);
        validate_description(&input.description, &mut errors);
        self.validate_permissions(&input.permissions, &mut errors);
        if input.is_system {
            errors.push(FieldError::new(
                "is_system",
                "system roles are defined by the permission catalog",
            ));
        }
        if !errors.is_empty() {
            return Err(SentinelError::Validation { errors });
        }

        let role = self
            .roles
            .create(CreateRole {
                name: input.name.trim().to_string(),
                permissions: dedup(input.permissions),
                ..input
            })
            .await?;

        info!(role = %role.name, "role created");
        Ok(role)
    }

    /// Edit the role called `name`. System roles keep their name.
    pub async fn update_role(&self, name: &str, input: UpdateRole) -> SentinelResult<Role> {
        let mut errors = Vec::new();
        if let Some(new_name) = &input.name {
            validate_name(new_name, &mut errors);
        }
        if let Some(description) = &input.description {
            validate_description(description, &mut errors);
        }
        if let Some(permissions) = &input.permissions {
            self.validate_permissions(permissions, &mut errors);
        }
        if input.is_system.is_some() {
            errors.push(FieldError::new("is_system", "cannot be changed"));
        }
        if !errors.is_empty() {
            return Err(SentinelError::Validation { errors });
        }

        let existing = self.roles.find_by_name(name).await?;

        let renamed = input
            .name
            .as_deref()
            .is_some_and(|n| role_key(n) != role_key(&existing.name));
        if existing.is_system && renamed {
            return Err(SentinelError::PermissionDenied {
                reason: format!("system role '{}' cannot be renamed", existing.name),
            });
        }

        let role = self
            .roles
            .update(
                existing.id,
                UpdateRole {
                    name: input.name.map(|n| n.trim().to_string()),
                    permissions: input.permissions.map(dedup),
                    ..input
                },
            )
            .await?;

        info!(role = %role.name, "role updated");
        Ok(role)
    }

    pub async fn delete_role(&self, name: &str) -> SentinelResult<()> {
        let existing = self.roles.find_by_name(name).await?;
        if existing.is_system {
            return Err(SentinelError::PermissionDenied {
                reason: format!("system role '{}' cannot be deleted", existing.name),
            });
        }

        self.roles.delete(existing.id).await?;
        info!(role = %existing.name, "role deleted");
        Ok(())
    }

    fn validate_permissions(&self, permissions: &[String], errors: &mut Vec<FieldError>) {
        for permission in permissions {
            if !self.catalog.is_known(permission) {
                errors.push(FieldError::new(
                    "permissions",
                    format!("unknown permission '{permission}'"),
                ));
            }
        }
    }
}

fn validate_name(name: &str, errors: &mut Vec<FieldError>) {
    let name = name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("name", "must not be empty"));
    } else if name.chars().count() > MAX_ROLE_NAME_LEN {
        errors.push(FieldError::new(
            "name",
            format!("must be at most {MAX_ROLE_NAME_LEN} characters"),
        ));
    }
}

fn validate_description(description: &str, errors: &mut Vec<FieldError>) {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        errors.push(FieldError::new(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
        ));
    }
}

fn dedup(mut permissions: Vec<String>) -> Vec<String> {
    permissions.sort();
    permissions.dedup();
    permissions
}
