//! Audit event domain model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    LoginSuccess,
    LoginFailedPassword,
    LoginFailedUserNotFound,
    LoginFailedInactive,
    LoginFailedLocked,
    AccountLocked,
    AccountUnlocked,
    Logout,
    SessionCreateFailed,
    PasswordReset,
    PermissionDenied,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailedPassword => "LOGIN_FAILED_PASSWORD",
            Self::LoginFailedUserNotFound => "LOGIN_FAILED_USER_NOT_FOUND",
            Self::LoginFailedInactive => "LOGIN_FAILED_INACTIVE",
            Self::LoginFailedLocked => "LOGIN_FAILED_LOCKED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountUnlocked => "ACCOUNT_UNLOCKED",
            Self::Logout => "LOGOUT",
            Self::SessionCreateFailed => "SESSION_CREATE_FAILED",
            Self::PasswordReset => "PASSWORD_RESET",
            Self::PermissionDenied => "PERMISSION_DENIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "LOGIN_SUCCESS" => Self::LoginSuccess,
            "LOGIN_FAILED_PASSWORD" => Self::LoginFailedPassword,
            "LOGIN_FAILED_USER_NOT_FOUND" => Self::LoginFailedUserNotFound,
            "LOGIN_FAILED_INACTIVE" => Self::LoginFailedInactive,
            "LOGIN_FAILED_LOCKED" => Self::LoginFailedLocked,
            "ACCOUNT_LOCKED" => Self::AccountLocked,
            "ACCOUNT_UNLOCKED" => Self::AccountUnlocked,
            "LOGOUT" => Self::Logout,
            "SESSION_CREATE_FAILED" => Self::SessionCreateFailed,
            "PASSWORD_RESET" => Self::PasswordReset,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            _ => return None,
        })
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Denied => "Denied",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub outcome: AuditOutcome,
    pub actor_id: Option<Uuid>,
    pub username: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, outcome: AuditOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            outcome,
            actor_id: None,
            username: None,
            ip_address: None,
            user_agent: None,
            detail: serde_json::Value::Object(Default::default()),
            timestamp,
        }
    }

    pub fn actor(mut self, id: Uuid, username: impl Into<String>) -> Self {
        self.actor_id = Some(id);
        self.username = Some(username.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn origin(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
