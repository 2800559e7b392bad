//! Risk and privilege classifications and the comparator between them.
//!
//! Both enumerations are ordered most-restrictive-first. They are sized
//! independently (six risk levels, five privilege levels), so comparison
//! happens on each value's rank counted from the bottom of its own
//! enumeration rather than on raw ordinals.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Risk levels
// ---------------------------------------------------------------------------

/// Risk rating attached to a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Must never be granted to anyone.
    Blocked,
    /// Only the most privileged entities may hold it.
    Critical,
    /// Reserved for administrators and developers.
    High,
    /// Power users and above.
    Medium,
    /// Safe for standard users.
    Low,
    /// Classified, but the risk has not been assessed yet.
    Unknown,
}

impl RiskLevel {
    /// All risk levels, most restrictive first.
    pub const ALL: [RiskLevel; 6] = [
        RiskLevel::Blocked,
        RiskLevel::Critical,
        RiskLevel::High,
        RiskLevel::Medium,
        RiskLevel::Low,
        RiskLevel::Unknown,
    ];

    fn ordinal(self) -> usize {
        self as usize
    }

    fn rank_from_bottom(self) -> usize {
        Self::ALL.len().saturating_sub(self.ordinal())
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Blocked => "BLOCKED",
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Privilege levels
// ---------------------------------------------------------------------------

/// Privilege rating attached to a profile, permission set or user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivilegeLevel {
    /// Full administrative access.
    Admin,
    /// Developer access.
    Developer,
    /// Elevated business user.
    PowerUser,
    /// Regular business user.
    StandardUser,
    /// Privilege has not been assessed; entities with this level are not audited.
    Unknown,
}

impl PrivilegeLevel {
    /// All privilege levels, most privileged first.
    pub const ALL: [PrivilegeLevel; 5] = [
        PrivilegeLevel::Admin,
        PrivilegeLevel::Developer,
        PrivilegeLevel::PowerUser,
        PrivilegeLevel::StandardUser,
        PrivilegeLevel::Unknown,
    ];

    fn ordinal(self) -> usize {
        self as usize
    }

    fn rank_from_bottom(self) -> usize {
        Self::ALL.len().saturating_sub(self.ordinal())
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Admin => "ADMIN",
            Self::Developer => "DEVELOPER",
            Self::PowerUser => "POWER_USER",
            Self::StandardUser => "STANDARD_USER",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

/// Whether an entity at `privilege` may hold a permission rated `risk`.
///
/// Each value is ranked from the bottom of its own enumeration
/// (`len - ordinal`); the grant is allowed iff the privilege rank is at
/// least the risk rank. `BLOCKED` therefore outranks every privilege level.
pub fn allowed(risk: RiskLevel, privilege: PrivilegeLevel) -> bool {
    privilege.rank_from_bottom() >= risk.rank_from_bottom()
}

// ---------------------------------------------------------------------------
// Classification entries
// ---------------------------------------------------------------------------

/// Operator classification of a single permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionClassification {
    /// Human-readable label of the permission.
    #[serde(default)]
    pub label: Option<String>,
    /// Why the permission carries this rating.
    #[serde(default)]
    pub reason: Option<String>,
    /// Assigned risk level.
    pub risk_level: RiskLevel,
}

/// Operator classification of a profile, permission set or user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityClassification {
    /// Assigned privilege level.
    pub privilege_level: PrivilegeLevel,
}
