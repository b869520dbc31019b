//! The closed permission catalog and the system roles built from it.
//!
//! Permissions are never created at runtime. Every capability string a
//! caller checks must appear here; anything else is a configuration bug.

use std::collections::HashSet;

use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::models::role::role_key;

/// Reserved role name that bypasses every permission check.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDef {
    pub name: String,
    pub description: String,
    /// Granted only when the acting user owns the target resource.
    pub owner_scoped: bool,
}

impl PermissionDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            owner_scoped: false,
        }
    }

    pub fn owner_scoped(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            owner_scoped: true,
            ..Self::new(name, description)
        }
    }
}

/// A role the application seeds at startup and protects from rename/delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRoleDef {
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    permissions: Vec<PermissionDef>,
    system_roles: Vec<SystemRoleDef>,
}

const STANDARD_PERMISSIONS: &[(&str, &str, bool)] = &[
    ("users.read", "View user accounts", false),
    ("users.create", "Create user accounts", false),
    ("users.update", "Edit user accounts", false),
    ("users.delete", "Delete user accounts", false),
    ("roles.manage", "Create, edit and delete roles", false),
    ("networks.read", "View networks", false),
    ("networks.create", "Create networks", false),
    ("networks.update", "Edit networks", false),
    ("networks.delete", "Delete networks", false),
    ("cnpj.read", "View tax-ID records", false),
    ("cnpj.create", "Create tax-ID records", false),
    ("cnpj.update", "Edit tax-ID records", false),
    ("cnpj.delete", "Delete tax-ID records", false),
    ("import.execute", "Run spreadsheet and CSV imports", false),
    ("export.execute", "Export data", false),
    ("audit.read", "Read the audit log", false),
    ("profile.read.own", "View one's own profile", true),
    ("profile.update.own", "Edit one's own profile", true),
];

const EDITOR_PERMISSIONS: &[&str] = &[
    "users.read",
    "networks.read",
    "networks.create",
    "networks.update",
    "networks.delete",
    "cnpj.read",
    "cnpj.create",
    "cnpj.update",
    "cnpj.delete",
    "import.execute",
    "export.execute",
    "profile.read.own",
    "profile.update.own",
];

const VIEWER_PERMISSIONS: &[&str] = &[
    "users.read",
    "networks.read",
    "cnpj.read",
    "export.execute",
    "profile.read.own",
    "profile.update.own",
];

const USER_PERMISSIONS: &[&str] = &[
    "networks.read",
    "cnpj.read",
    "profile.read.own",
    "profile.update.own",
];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

impl PermissionCatalog {
    pub fn new(permissions: Vec<PermissionDef>, system_roles: Vec<SystemRoleDef>) -> Self {
        Self {
            permissions,
            system_roles,
        }
    }

    /// The application's catalog: the standard permissions plus the
    /// `admin`, `editor`, `viewer` and `user` system roles.
    pub fn standard() -> Self {
        let permissions: Vec<PermissionDef> = STANDARD_PERMISSIONS
            .iter()
            .map(|(name, description, owner_scoped)| PermissionDef {
                name: (*name).to_string(),
                description: (*description).to_string(),
                owner_scoped: *owner_scoped,
            })
            .collect();

        let all: Vec<String> = permissions.iter().map(|p| p.name.clone()).collect();

        let system_roles = vec![
            SystemRoleDef {
                name: ADMIN_ROLE.into(),
                description: "Full access to every feature".into(),
                permissions: all,
            },
            SystemRoleDef {
                name: "editor".into(),
                description: "Maintains business records".into(),
                permissions: owned(EDITOR_PERMISSIONS),
            },
            SystemRoleDef {
                name: "viewer".into(),
                description: "Read-only access to business records".into(),
                permissions: owned(VIEWER_PERMISSIONS),
            },
            SystemRoleDef {
                name: "user".into(),
                description: "Basic access and own profile".into(),
                permissions: owned(USER_PERMISSIONS),
            },
        ];

        Self::new(permissions, system_roles)
    }

    pub fn permissions(&self) -> &[PermissionDef] {
        &self.permissions
    }

    pub fn system_roles(&self) -> &[SystemRoleDef] {
        &self.system_roles
    }

    pub fn get(&self, name: &str) -> Option<&PermissionDef> {
        self.permissions.iter().find(|p| p.name == name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_owner_scoped(&self, name: &str) -> bool {
        self.get(name).is_some_and(|p| p.owner_scoped)
    }

    /// Whether `name` is one of the catalog's system roles (case-insensitive).
    pub fn is_system_role(&self, name: &str) -> bool {
        let key = role_key(name);
        self.system_roles.iter().any(|r| role_key(&r.name) == key)
    }

    /// Startup checks: the catalog must define at least one permission and
    /// one system role, names must be unique, and system roles may only
    /// reference known permissions.
    pub fn validate(&self) -> SentinelResult<()> {
        if self.permissions.is_empty() {
            return Err(SentinelError::Configuration(
                "permission catalog defines no permissions".into(),
            ));
        }
        if self.system_roles.is_empty() {
            return Err(SentinelError::Configuration(
                "permission catalog defines no system roles".into(),
            ));
        }

        let mut seen = HashSet::new();
        for permission in &self.permissions {
            if !seen.insert(permission.name.as_str()) {
                return Err(SentinelError::Configuration(format!(
                    "permission '{}' is defined twice",
                    permission.name
                )));
            }
        }

        let mut roles = HashSet::new();
        for role in &self.system_roles {
            if !roles.insert(role_key(&role.name)) {
                return Err(SentinelError::Configuration(format!(
                    "system role '{}' is defined twice",
                    role.name
                )));
            }
            if let Some(unknown) = role.permissions.iter().find(|p| !seen.contains(p.as_str())) {
                return Err(SentinelError::Configuration(format!(
                    "system role '{}' references unknown permission '{unknown}'",
                    role.name
                )));
            }
        }

        Ok(())
    }
}
