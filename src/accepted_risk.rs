//! Accepted risks: pre-approved violations muted with a justification.
//!
//! The tree is keyed policy → rule → identifier segments and ends in a leaf
//! `{ reason }`. A `"*"` key is a wildcard sibling, taken only when no key
//! matches the segment exactly. There is no backtracking: once an exact key
//! is chosen the walk never retries through `"*"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigurationError, PolicyKind};
use crate::result::{MutedViolation, RuleResult, Violation};

/// Wildcard key matching any single identifier segment.
pub const WILDCARD: &str = "*";

/// Leaf of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptedRisk {
    /// Justification for accepting the risk.
    pub reason: String,
}

/// A node of the accepted-risk tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RiskNode {
    /// Terminal accepted risk.
    Leaf(AcceptedRisk),
    /// Nested segment keys.
    Branch(BTreeMap<String, RiskNode>),
}

/// Accepted risks for a whole run, keyed by policy name at the top level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcceptedRiskTree {
    roots: BTreeMap<String, RiskNode>,
}

impl AcceptedRiskTree {
    /// Build a tree from its top-level policy entries.
    pub fn new(roots: BTreeMap<String, RiskNode>) -> Self {
        Self { roots }
    }

    /// Parse a tree from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MalformedAcceptedRisk`] if the value is
    /// not a valid tree.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigurationError> {
        let tree: Self =
            serde_json::from_value(value).map_err(|e| ConfigurationError::MalformedAcceptedRisk {
                path: "/".to_owned(),
                message: e.to_string(),
            })?;
        tree.validate()?;
        Ok(tree)
    }

    /// Whether no accepted risk is configured.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Subtree of accepted risks for one rule of one policy.
    pub fn rule_subtree(
        &self,
        policy: PolicyKind,
        rule_name: &str,
    ) -> Option<&BTreeMap<String, RiskNode>> {
        match self.roots.get(policy.as_str())? {
            RiskNode::Branch(rules) => match rules.get(rule_name)? {
                RiskNode::Branch(subtree) => Some(subtree),
                RiskNode::Leaf(_) => None,
            },
            RiskNode::Leaf(_) => None,
        }
    }

    /// Check the tree shape.
    ///
    /// Policy and rule levels must be branches, policy keys must name a
    /// known policy, and every reason must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MalformedAcceptedRisk`] naming the first
    /// offending node.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (policy, node) in &self.roots {
            if policy.parse::<PolicyKind>().is_err() {
                return Err(malformed(&[policy], "unknown policy"));
            }
            let RiskNode::Branch(rules) = node else {
                return Err(malformed(&[policy], "expected rule names, found a leaf"));
            };
            for (rule, node) in rules {
                let RiskNode::Branch(children) = node else {
                    return Err(malformed(&[policy, rule], "expected identifiers, found a leaf"));
                };
                let mut path = vec![policy.as_str(), rule.as_str()];
                validate_children(children, &mut path)?;
            }
        }
        Ok(())
    }
}

fn validate_children<'a>(
    children: &'a BTreeMap<String, RiskNode>,
    path: &mut Vec<&'a str>,
) -> Result<(), ConfigurationError> {
    for (key, node) in children {
        path.push(key);
        match node {
            RiskNode::Leaf(risk) if risk.reason.trim().is_empty() => {
                return Err(malformed(path.as_slice(), "reason must not be empty"));
            }
            RiskNode::Leaf(_) => {}
            RiskNode::Branch(grandchildren) => validate_children(grandchildren, path)?,
        }
        path.pop();
    }
    Ok(())
}

fn malformed<S: AsRef<str>>(path: &[S], message: &str) -> ConfigurationError {
    let joined: Vec<&str> = path.iter().map(AsRef::as_ref).collect();
    ConfigurationError::MalformedAcceptedRisk {
        path: joined.join("/"),
        message: message.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Outcome of matching one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskMatch<'t> {
    /// The matched leaf.
    pub risk: &'t AcceptedRisk,
    /// Tree keys walked to reach it, `"*"` where the wildcard was taken.
    pub path: Vec<String>,
}

/// Walk `identifier` through a rule subtree.
///
/// Each segment selects its exact key, or `"*"` when no exact key exists.
/// The identifier matches only when the leaf is reached on its final
/// segment; a leaf met earlier, or segments running out while still inside
/// a branch, is no match.
pub fn match_identifier<'t>(
    subtree: &'t BTreeMap<String, RiskNode>,
    identifier: &[String],
) -> Option<RiskMatch<'t>> {
    let mut node = subtree;
    let mut path = Vec::with_capacity(identifier.len());

    for (depth, segment) in identifier.iter().enumerate() {
        let (key, child) = match node.get(segment) {
            Some(child) => (segment.as_str(), child),
            None => (WILDCARD, node.get(WILDCARD)?),
        };
        path.push(key.to_owned());

        match child {
            RiskNode::Leaf(risk) => {
                let last = depth.saturating_add(1) == identifier.len();
                return last.then_some(RiskMatch { risk, path });
            }
            RiskNode::Branch(children) => node = children,
        }
    }
    None
}

/// Applies accepted risks to rule results. Built once per finalise pass.
#[derive(Debug, Clone, Copy)]
pub struct AcceptedRiskMatcher<'t> {
    tree: &'t AcceptedRiskTree,
}

impl<'t> AcceptedRiskMatcher<'t> {
    /// Create a matcher over a tree.
    pub fn new(tree: &'t AcceptedRiskTree) -> Self {
        Self { tree }
    }

    /// Partition a rule result's violations into unmatched and muted.
    ///
    /// Returns a new result; the input is not modified. Without a subtree
    /// for the rule the result is returned as is.
    pub fn scrub(&self, policy: PolicyKind, result: &RuleResult) -> RuleResult {
        let Some(subtree) = self.tree.rule_subtree(policy, &result.rule_name) else {
            return result.clone();
        };

        let mut violations: Vec<Violation> = Vec::with_capacity(result.violations.len());
        let mut muted: Vec<MutedViolation> = result.muted_violations.clone();

        for violation in &result.violations {
            match match_identifier(subtree, &violation.identifier) {
                Some(found) => muted.push(MutedViolation {
                    violation: violation.clone(),
                    reason: found.risk.reason.clone(),
                    source_path: Some(found.path),
                }),
                None => violations.push(violation.clone()),
            }
        }

        debug!(
            %policy,
            rule = %result.rule_name,
            muted = muted.len().saturating_sub(result.muted_violations.len()),
            remaining = violations.len(),
            "accepted risks applied"
        );

        RuleResult {
            violations,
            muted_violations: muted,
            ..result.clone()
        }
    }
}
