//! Accepted-risk tree parsing and validation.

use serde_json::json;

use orgaudit::accepted_risk::AcceptedRiskTree;
use orgaudit::config::{ConfigurationError, PolicyKind};

#[test]
fn valid_tree_parses() {
    let tree = AcceptedRiskTree::from_value(json!({
        "profiles": {
            "EnforcePermissionClassifications": {
                "System Administrator": { "*": { "reason": "admins hold everything" } }
            }
        }
    }))
    .expect("tree should parse");

    assert!(!tree.is_empty());
    assert!(tree
        .rule_subtree(PolicyKind::Profiles, "EnforcePermissionClassifications")
        .is_some());
    assert!(tree.rule_subtree(PolicyKind::Users, "EnforcePermissionClassifications").is_none());
    assert!(tree.rule_subtree(PolicyKind::Profiles, "OtherRule").is_none());
}

#[test]
fn unknown_policy_is_rejected() {
    let result = AcceptedRiskTree::from_value(json!({
        "dashboards": { "SomeRule": { "x": { "reason": "r" } } }
    }));
    match result {
        Err(ConfigurationError::MalformedAcceptedRisk { path, .. }) => assert_eq!(path, "dashboards"),
        other => panic!("expected MalformedAcceptedRisk, got {other:?}"),
    }
}

#[test]
fn leaf_at_rule_level_is_rejected() {
    let result = AcceptedRiskTree::from_value(json!({
        "users": { "NoInactiveUsers": { "reason": "too broad" } }
    }));
    match result {
        Err(ConfigurationError::MalformedAcceptedRisk { path, .. }) => {
            assert_eq!(path, "users/NoInactiveUsers");
        }
        other => panic!("expected MalformedAcceptedRisk, got {other:?}"),
    }
}

#[test]
fn empty_reason_is_rejected() {
    let result = AcceptedRiskTree::from_value(json!({
        "users": { "NoInactiveUsers": { "svc@example.com": { "reason": "  " } } }
    }));
    match result {
        Err(ConfigurationError::MalformedAcceptedRisk { path, message }) => {
            assert_eq!(path, "users/NoInactiveUsers/svc@example.com");
            assert!(message.contains("empty"));
        }
        other => panic!("expected MalformedAcceptedRisk, got {other:?}"),
    }
}

#[test]
fn non_object_is_rejected() {
    assert!(AcceptedRiskTree::from_value(json!(["not", "a", "tree"])).is_err());
}

#[test]
fn default_tree_is_empty_and_valid() {
    let tree = AcceptedRiskTree::default();
    assert!(tree.is_empty());
    tree.validate().expect("empty tree should be valid");
}
