//! Run configuration: classifications, policies and accepted risks.
//!
//! The configuration is assembled once by the caller and treated as
//! immutable for the lifetime of an audit run. Every type deserializes from
//! camelCase keys so any serde format works; [`RunConfig::load`] reads TOML.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

use crate::accepted_risk::AcceptedRiskTree;
use crate::classification::{EntityClassification, PermissionClassification};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal configuration problems. These abort a run before it starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// No enabled policy is configured, so nothing would be audited.
    #[error("no executable policies configured")]
    NoExecutablePolicies,

    /// A rule's options did not parse into its typed option struct.
    #[error("invalid options for rule {rule} in policy {policy}: {source}")]
    InvalidRuleOptions {
        /// Policy that configures the rule.
        policy: PolicyKind,
        /// Configured rule name.
        rule: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The accepted-risk tree has an invalid shape.
    #[error("malformed accepted risk at {path}: {message}")]
    MalformedAcceptedRisk {
        /// Slash-joined tree path of the offending node.
        path: String,
        /// What is wrong with it.
        message: String,
    },

    /// A convention-based rule registry was given an invalid naming pattern.
    #[error("invalid rule naming pattern: {0}")]
    RulePattern(#[from] regex::Error),
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// The closed set of audit domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyKind {
    /// Profiles and the permissions they grant.
    Profiles,
    /// Permission sets and the permissions they grant.
    PermissionSets,
    /// Active users, their effective permissions and login behaviour.
    Users,
    /// Connected apps and OAuth usage.
    ConnectedApps,
    /// Organisation settings groups.
    Settings,
}

impl PolicyKind {
    /// Every policy kind.
    pub const ALL: [PolicyKind; 5] = [
        PolicyKind::Profiles,
        PolicyKind::PermissionSets,
        PolicyKind::Users,
        PolicyKind::ConnectedApps,
        PolicyKind::Settings,
    ];

    /// Key used in configuration files, results and the accepted-risk tree.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::PermissionSets => "permissionSets",
            Self::Users => "users",
            Self::ConnectedApps => "connectedApps",
            Self::Settings => "settings",
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown policy {s}"))
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one rule inside a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Whether the rule executes.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Untyped option bag, parsed by the rule at construction.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            options: serde_json::Value::Null,
        }
    }
}

impl RuleConfig {
    /// An enabled rule with the given options.
    pub fn with_options(options: serde_json::Value) -> Self {
        Self {
            enabled: true,
            options,
        }
    }

    /// A rule that is configured but switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            options: serde_json::Value::Null,
        }
    }
}

/// Configuration of one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// Whether the policy resolves and runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rule name to rule configuration.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

/// Operator-defined risk and privilege ratings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Classifications {
    /// Permission name to risk classification.
    pub permissions: BTreeMap<String, PermissionClassification>,
    /// Profile name to privilege classification.
    pub profiles: BTreeMap<String, EntityClassification>,
    /// Permission set name to privilege classification.
    pub permission_sets: BTreeMap<String, EntityClassification>,
    /// Username to privilege classification.
    pub users: BTreeMap<String, EntityClassification>,
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Everything an audit run needs besides the remote connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    /// Risk and privilege ratings.
    pub classifications: Classifications,
    /// Policy configuration keyed by domain.
    #[serde(deserialize_with = "deserialize_policies")]
    pub policies: BTreeMap<PolicyKind, PolicyConfig>,
    /// Pre-approved violations with their justification.
    pub accepted_risks: AcceptedRiskTree,
}

impl RunConfig {
    /// Parse a run configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or does not match the
    /// configuration schema.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: RunConfig =
            toml::from_str(contents).context("failed to parse run config TOML")?;
        Ok(config)
    }

    /// Load a run configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run config {}", path.display()))?;
        tracing::info!(path = %path.display(), "loading run config from file");
        Self::from_toml_str(&contents)
    }

    /// Configuration of a policy, if present.
    pub fn policy(&self, kind: PolicyKind) -> Option<&PolicyConfig> {
        self.policies.get(&kind)
    }

    /// Number of configured policies that are enabled.
    pub fn enabled_policy_count(&self) -> usize {
        self.policies.values().filter(|p| p.enabled).count()
    }
}

/// Policy keys arrive as strings in every format; map them onto [`PolicyKind`].
fn deserialize_policies<'de, D>(deserializer: D) -> Result<BTreeMap<PolicyKind, PolicyConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, PolicyConfig>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, config)| {
            key.parse::<PolicyKind>()
                .map(|kind| (kind, config))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}
