//! Identifier matching and violation scrubbing.

use std::collections::BTreeMap;

use serde_json::json;

use orgaudit::accepted_risk::{match_identifier, AcceptedRiskMatcher, AcceptedRiskTree, RiskNode};
use orgaudit::config::PolicyKind;
use orgaudit::result::{RuleResult, Violation};

const RULE: &str = "EnforcePermissionClassifications";

fn tree() -> AcceptedRiskTree {
    AcceptedRiskTree::from_value(json!({
        "profiles": {
            RULE: {
                "A": {
                    "B": { "reason": "x" },
                    "*": { "reason": "y" }
                }
            }
        }
    }))
    .expect("tree should parse")
}

fn subtree(tree: &AcceptedRiskTree) -> &BTreeMap<String, RiskNode> {
    tree.rule_subtree(PolicyKind::Profiles, RULE)
        .expect("rule subtree should exist")
}

fn id(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn exact_key_wins_over_wildcard() {
    let tree = tree();
    let found = match_identifier(subtree(&tree), &id(&["A", "B"])).expect("should match");
    assert_eq!(found.risk.reason, "x");
    assert_eq!(found.path, id(&["A", "B"]));
}

#[test]
fn wildcard_matches_other_segments() {
    let tree = tree();
    let found = match_identifier(subtree(&tree), &id(&["A", "C"])).expect("should match");
    assert_eq!(found.risk.reason, "y");
    assert_eq!(found.path, id(&["A", "*"]));
}

#[test]
fn longer_identifier_past_a_leaf_is_unmatched() {
    let tree = tree();
    assert!(match_identifier(subtree(&tree), &id(&["A", "B", "C"])).is_none());
}

#[test]
fn identifier_ending_inside_a_branch_is_unmatched() {
    let tree = tree();
    assert!(match_identifier(subtree(&tree), &id(&["A"])).is_none());
}

#[test]
fn unknown_first_segment_is_unmatched() {
    let tree = tree();
    assert!(match_identifier(subtree(&tree), &id(&["Z", "B"])).is_none());
}

#[test]
fn no_backtracking_through_wildcard() {
    // "A" matches exactly, so the "*" sibling at the root is never tried.
    let tree = AcceptedRiskTree::from_value(json!({
        "profiles": {
            RULE: {
                "A": { "B": { "reason": "exact" } },
                "*": { "C": { "reason": "wild" } }
            }
        }
    }))
    .expect("tree should parse");
    assert!(match_identifier(subtree(&tree), &id(&["A", "C"])).is_none());
    let found = match_identifier(subtree(&tree), &id(&["Q", "C"])).expect("should match");
    assert_eq!(found.risk.reason, "wild");
}

fn rule_result(identifiers: &[&[&str]]) -> RuleResult {
    RuleResult {
        rule_name: RULE.to_owned(),
        is_compliant: identifiers.is_empty(),
        violations: identifiers
            .iter()
            .map(|segments| Violation::new(segments.iter().copied(), "finding"))
            .collect(),
        muted_violations: Vec::new(),
        compliant_entities: Vec::new(),
        violated_entities: Vec::new(),
        warnings: Vec::new(),
        errors: Vec::new(),
    }
}

#[test]
fn scrub_partitions_violations() {
    let tree = tree();
    let matcher = AcceptedRiskMatcher::new(&tree);
    let input = rule_result(&[&["A", "B"], &["A", "C"], &["A", "B", "C"]]);

    let scrubbed = matcher.scrub(PolicyKind::Profiles, &input);

    assert_eq!(scrubbed.violations.len(), 1);
    assert_eq!(scrubbed.violations[0].identifier, id(&["A", "B", "C"]));
    assert_eq!(scrubbed.muted_violations.len(), 2);
    let reasons: Vec<&str> = scrubbed
        .muted_violations
        .iter()
        .map(|m| m.reason.as_str())
        .collect();
    assert_eq!(reasons, vec!["x", "y"]);
    assert_eq!(
        scrubbed.muted_violations[1].source_path,
        Some(id(&["A", "*"]))
    );
    // Partition law: nothing lost, nothing invented.
    assert_eq!(
        scrubbed.violations.len() + scrubbed.muted_violations.len(),
        input.violations.len()
    );
    // The input is untouched.
    assert_eq!(input.violations.len(), 3);
    assert!(input.muted_violations.is_empty());
}

#[test]
fn scrub_with_empty_tree_is_identity() {
    let tree = AcceptedRiskTree::default();
    let matcher = AcceptedRiskMatcher::new(&tree);
    let input = rule_result(&[&["A", "B"], &["Q"]]);
    assert_eq!(matcher.scrub(PolicyKind::Profiles, &input), input);
}

#[test]
fn scrub_ignores_other_policies() {
    let tree = tree();
    let matcher = AcceptedRiskMatcher::new(&tree);
    let input = rule_result(&[&["A", "B"]]);
    assert_eq!(matcher.scrub(PolicyKind::PermissionSets, &input), input);
}
