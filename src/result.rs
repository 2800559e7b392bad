//! Audit output: violations, rule results, policy results and the final
//! audit result.
//!
//! Everything here serializes to camelCase JSON for the report renderer.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PolicyKind;

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// A single non-compliant finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Ordered path identifying the finding. The first segment names the
    /// audited entity.
    pub identifier: Vec<String>,
    /// What is wrong.
    pub message: String,
    /// How to fix it, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Violation {
    /// Create a violation without a hint.
    pub fn new<I, S>(identifier: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifier: identifier.into_iter().map(Into::into).collect(),
            message: message.into(),
            hint: None,
        }
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Name of the entity this violation belongs to.
    pub fn entity(&self) -> Option<&str> {
        self.identifier.first().map(String::as_str)
    }
}

/// A violation covered by an accepted risk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutedViolation {
    /// The original violation.
    #[serde(flatten)]
    pub violation: Violation,
    /// Justification recorded with the accepted risk.
    pub reason: String,
    /// Tree path of the accepted risk that matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<Vec<String>>,
}

/// Something a rule could not fully evaluate. Does not affect compliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleWarning {
    /// Ordered path identifying what the warning is about.
    pub identifier: Vec<String>,
    /// Description of the problem.
    pub message: String,
}

impl RuleWarning {
    /// Create a warning.
    pub fn new<I, S>(identifier: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifier: identifier.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }
}

/// A remote sub-operation failed while a rule was evaluating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleError {
    /// Name of the failed operation.
    pub name: String,
    /// Failure description.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Entity resolution
// ---------------------------------------------------------------------------

/// Why a classified entity could not be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolveFailure {
    /// The entity does not exist on the remote system.
    NotFound,
    /// The entity is classified with an unknown privilege level.
    PrivilegeUnknown,
    /// The entity exists remotely but has no classification.
    Unclassified,
    /// The entity's metadata could not be fetched.
    MetadataUnavailable,
    /// A remote object listing the domain's entities could not be read.
    /// `name` is the object, not an entity.
    SourceUnavailable,
}

/// A classification entry that could not be evaluated this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResolveError {
    /// Entity name.
    pub name: String,
    /// Failure category.
    pub reason: ResolveFailure,
    /// Human-readable detail.
    pub message: String,
}

impl EntityResolveError {
    /// Entity does not exist remotely.
    pub fn not_found(name: impl Into<String>, kind: &str) -> Self {
        let name = name.into();
        let message = format!("{kind} {name} was not found on the target system");
        Self {
            name,
            reason: ResolveFailure::NotFound,
            message,
        }
    }

    /// Entity is classified as UNKNOWN.
    pub fn privilege_unknown(name: impl Into<String>, kind: &str) -> Self {
        let name = name.into();
        let message = format!("{kind} {name} has privilege level UNKNOWN and is not audited");
        Self {
            name,
            reason: ResolveFailure::PrivilegeUnknown,
            message,
        }
    }

    /// Entity exists but carries no classification.
    pub fn unclassified(name: impl Into<String>, kind: &str) -> Self {
        let name = name.into();
        let message = format!("{kind} {name} is not classified");
        Self {
            name,
            reason: ResolveFailure::Unclassified,
            message,
        }
    }

    /// Metadata for the entity could not be fetched.
    pub fn metadata_unavailable(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: ResolveFailure::MetadataUnavailable,
            message: detail.into(),
        }
    }

    /// A remote object the domain enumerates entities from could not be read.
    pub fn source_unavailable(object: impl Into<String>, detail: impl Into<String>) -> Self {
        let object = object.into();
        let message = format!("{object} could not be read: {}", detail.into());
        Self {
            name: object,
            reason: ResolveFailure::SourceUnavailable,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Rule results
// ---------------------------------------------------------------------------

/// Raw output of a rule before the policy completes it.
///
/// Rules may leave the entity partition empty; the policy derives it from
/// the violations in that case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRuleResult {
    /// Name the rule was configured under.
    pub rule_name: String,
    /// Findings.
    pub violations: Vec<Violation>,
    /// Incomplete evaluations.
    pub warnings: Vec<RuleWarning>,
    /// Failed remote sub-operations.
    pub errors: Vec<RuleError>,
    /// Entities the rule itself considers compliant.
    pub compliant_entities: Option<Vec<String>>,
    /// Entities the rule itself considers violated.
    pub violated_entities: Option<Vec<String>>,
}

impl PartialRuleResult {
    /// Empty result for the named rule.
    pub fn new(rule_name: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            ..Self::default()
        }
    }
}

/// Completed result of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    /// Name the rule was configured under.
    pub rule_name: String,
    /// True when no unmuted violation remains.
    pub is_compliant: bool,
    /// Unmuted findings.
    pub violations: Vec<Violation>,
    /// Findings covered by an accepted risk.
    pub muted_violations: Vec<MutedViolation>,
    /// Entities without findings.
    pub compliant_entities: Vec<String>,
    /// Entities with findings.
    pub violated_entities: Vec<String>,
    /// Incomplete evaluations.
    pub warnings: Vec<RuleWarning>,
    /// Failed remote sub-operations.
    pub errors: Vec<RuleError>,
}

impl RuleResult {
    /// Complete a partial result against the set of resolved entity names.
    ///
    /// The entity partition is taken from the rule when it supplied one and
    /// derived from violation identifiers otherwise. Entities reported as
    /// violated are never also reported compliant.
    pub fn complete<'a>(
        partial: PartialRuleResult,
        resolved: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let violated_set: BTreeSet<&str> = partial
            .violations
            .iter()
            .filter_map(Violation::entity)
            .collect();

        let violated_entities = match partial.violated_entities {
            Some(entities) => entities,
            None => violated_set.iter().map(|s| (*s).to_owned()).collect(),
        };

        let compliant_entities: Vec<String> = match partial.compliant_entities {
            Some(entities) => entities,
            None => resolved
                .into_iter()
                .filter(|name| !violated_set.contains(name.as_str()))
                .cloned()
                .collect(),
        };
        let compliant_entities = compliant_entities
            .into_iter()
            .filter(|name| !violated_entities.contains(name))
            .collect();

        Self {
            is_compliant: partial.violations.is_empty(),
            rule_name: partial.rule_name,
            violations: partial.violations,
            muted_violations: Vec::new(),
            compliant_entities,
            violated_entities,
            warnings: partial.warnings,
            errors: partial.errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy and audit results
// ---------------------------------------------------------------------------

/// A configured rule that did not execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRule {
    /// Configured rule name.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// A configured rule name that no registry entry matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResolveError {
    /// Configured rule name.
    pub name: String,
    /// Failure description.
    pub message: String,
}

/// Result of one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    /// Whether the policy was enabled.
    pub enabled: bool,
    /// AND over all executed rules; vacuously true.
    pub is_compliant: bool,
    /// Rule name to rule result.
    pub executed_rules: BTreeMap<String, RuleResult>,
    /// Configured rules that did not execute.
    pub skipped_rules: Vec<SkippedRule>,
    /// Configured rule names that could not be resolved.
    pub rule_resolve_errors: Vec<RuleResolveError>,
    /// Names of resolved entities.
    pub audited_entities: Vec<String>,
    /// Classification entries that could not be evaluated.
    pub ignored_entities: Vec<EntityResolveError>,
}

impl PolicyResult {
    /// Result of a policy that is switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            is_compliant: true,
            executed_rules: BTreeMap::new(),
            skipped_rules: Vec::new(),
            rule_resolve_errors: Vec::new(),
            audited_entities: Vec::new(),
            ignored_entities: Vec::new(),
        }
    }

    /// Recompute `is_compliant` from the executed rules.
    pub fn refresh_compliance(&mut self) {
        self.is_compliant = self.executed_rules.values().all(|r| r.is_compliant);
    }
}

/// Final output of an audit run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    /// AND over all enabled policies.
    pub is_compliant: bool,
    /// Identifier of the audited system.
    pub subject_id: String,
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
    /// Policy results keyed by domain.
    pub policies: BTreeMap<PolicyKind, PolicyResult>,
}

impl AuditResult {
    /// Assemble the audit result and compute overall compliance.
    pub fn new(subject_id: impl Into<String>, policies: BTreeMap<PolicyKind, PolicyResult>) -> Self {
        let is_compliant = policies
            .values()
            .filter(|p| p.enabled)
            .all(|p| p.is_compliant);
        Self {
            is_compliant,
            subject_id: subject_id.into(),
            timestamp: Utc::now(),
            policies,
        }
    }
}
