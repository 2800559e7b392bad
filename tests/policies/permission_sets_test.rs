//! Permission set resolution and classification enforcement.

use std::sync::Arc;

use orgaudit::classification::{PrivilegeLevel, RiskLevel};
use orgaudit::config::RunConfig;
use orgaudit::connection::MetadataCache;
use orgaudit::policies::{permission_sets, ResolveContext};

use crate::support::{entity, permission, permissions_document, policy_with_rules, MockConnection};

fn run_config() -> Arc<RunConfig> {
    let mut config = RunConfig::default();
    let permissions = &mut config.classifications.permissions;
    permissions.insert("AuthorApex".to_owned(), permission(RiskLevel::High));
    permissions.insert("ManageUsers".to_owned(), permission(RiskLevel::Blocked));
    config
        .classifications
        .permission_sets
        .insert("Api Access".to_owned(), entity(PrivilegeLevel::Admin));
    Arc::new(config)
}

fn connection() -> MockConnection {
    MockConnection::new("00D000000000001").with_metadata(
        "PermissionSet",
        "Api Access",
        permissions_document(&["ManageUsers", "AuthorApex"]),
    )
}

#[tokio::test]
async fn resolves_classified_permission_set() {
    let config = run_config();
    let policy = permission_sets::policy(policy_with_rules(&[]), &config)
        .expect("policy should build");
    let connection = connection();
    let cache = MetadataCache::new();
    let ctx = ResolveContext {
        connection: &connection,
        cache: &cache,
        events: None,
    };

    let resolution = policy.resolve(&ctx).await;

    assert!(resolution.ignored_entities.is_empty());
    let set = resolution
        .resolved_entities
        .get("Api Access")
        .expect("permission set should resolve");
    assert_eq!(set.privilege_level, PrivilegeLevel::Admin);
    assert_eq!(set.permissions, vec!["AuthorApex".to_owned(), "ManageUsers".to_owned()]);

    let retrieved = connection.retrieved_names.lock().expect("test lock").clone();
    assert_eq!(retrieved, vec![("PermissionSet".to_owned(), vec!["Api Access".to_owned()])]);
}

#[tokio::test]
async fn blocked_grant_violates_even_for_admin_set() {
    let config = run_config();
    let policy = permission_sets::policy(
        policy_with_rules(&["EnforcePermissionClassifications"]),
        &config,
    )
    .expect("policy should build");
    let connection = connection();
    let cache = MetadataCache::new();
    let ctx = ResolveContext {
        connection: &connection,
        cache: &cache,
        events: None,
    };

    let result = policy.run(&ctx).await;

    assert!(!result.is_compliant);
    assert_eq!(result.audited_entities, vec!["Api Access".to_owned()]);
    let rule = &result.executed_rules["EnforcePermissionClassifications"];
    assert_eq!(rule.violations.len(), 1);
    assert_eq!(
        rule.violations[0].identifier,
        vec!["Api Access".to_owned(), "ManageUsers".to_owned()]
    );
    assert_eq!(rule.violations[0].message, "Permission ManageUsers is blocked");
    assert_eq!(rule.violated_entities, vec!["Api Access".to_owned()]);
    assert!(rule.compliant_entities.is_empty());
}
