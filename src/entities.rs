//! Resolved entities: remote metadata merged with its classification.
//!
//! Each policy resolves its entities once per run. Rules only ever see them
//! through a shared reference.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classification::PrivilegeLevel;

/// An entity that grants permissions and carries a privilege level.
///
/// Implemented by every entity the permission classification rule audits.
pub trait PermissionHolder: Send + Sync {
    /// Entity name used as the first identifier segment of violations.
    fn name(&self) -> &str;
    /// Classified privilege level.
    fn privilege_level(&self) -> PrivilegeLevel;
    /// Names of enabled permissions, sorted and deduplicated.
    fn granted_permissions(&self) -> &[String];
}

/// A classified profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProfile {
    /// Profile name.
    pub name: String,
    /// Classified privilege level.
    pub privilege_level: PrivilegeLevel,
    /// Enabled permissions.
    pub permissions: Vec<String>,
}

impl PermissionHolder for ResolvedProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn privilege_level(&self) -> PrivilegeLevel {
        self.privilege_level
    }

    fn granted_permissions(&self) -> &[String] {
        &self.permissions
    }
}

/// A classified permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPermissionSet {
    /// Permission set name.
    pub name: String,
    /// Classified privilege level.
    pub privilege_level: PrivilegeLevel,
    /// Enabled permissions.
    pub permissions: Vec<String>,
}

impl PermissionHolder for ResolvedPermissionSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn privilege_level(&self) -> PrivilegeLevel {
        self.privilege_level
    }

    fn granted_permissions(&self) -> &[String] {
        &self.permissions
    }
}

/// A classified, active user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUser {
    /// Remote record id.
    pub id: String,
    /// Username.
    pub username: String,
    /// Classified privilege level.
    pub privilege_level: PrivilegeLevel,
    /// Assigned profile.
    pub profile: Option<String>,
    /// Assigned permission sets.
    pub permission_sets: Vec<String>,
    /// Effective permissions from the profile and all permission sets.
    pub permissions: Vec<String>,
    /// Last successful login, if the user ever logged in.
    pub last_login: Option<DateTime<Utc>>,
    /// When the user was created.
    pub created_date: Option<DateTime<Utc>>,
}

impl PermissionHolder for ResolvedUser {
    fn name(&self) -> &str {
        &self.username
    }

    fn privilege_level(&self) -> PrivilegeLevel {
        self.privilege_level
    }

    fn granted_permissions(&self) -> &[String] {
        &self.permissions
    }
}

/// A connected app, installed or merely used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConnectedApp {
    /// App name.
    pub name: String,
    /// Whether the app is installed and therefore under admin management.
    pub installed: bool,
    /// Whether only admin-approved users may authorize the app.
    /// `None` when the platform does not expose the setting.
    pub admin_approved_users_only: Option<bool>,
    /// Distinct users holding OAuth tokens for the app.
    pub token_users: usize,
}

/// A retrieved settings group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSettings {
    /// Settings group name (for example `Security`).
    pub name: String,
    /// Retrieved settings document.
    pub values: serde_json::Value,
}
