//! Connected app resolution.

use std::sync::Arc;

use serde_json::json;

use orgaudit::config::RunConfig;
use orgaudit::connection::MetadataCache;
use orgaudit::policies::{connected_apps, ResolveContext};
use orgaudit::result::ResolveFailure;

use crate::support::{policy_with_rules, MockConnection};

fn tokens() -> Vec<serde_json::Value> {
    vec![
        json!({ "AppName": "Data Loader", "UserId": "005A" }),
        json!({ "AppName": "Data Loader", "UserId": "005A" }),
        json!({ "AppName": "Data Loader", "UserId": "005B" }),
        json!({ "AppName": "Workbench", "UserId": "005C" }),
    ]
}

#[tokio::test]
async fn merges_installed_and_used_apps() {
    let config = Arc::new(RunConfig::default());
    let policy = connected_apps::policy(policy_with_rules(&[]), &config).expect("policy should build");
    let connection = MockConnection::new("00D000000000001")
        .with_describe("ConnectedApplication", &["Name", "OptionsAllowAdminApprovedUsersOnly"])
        .with_query(
            "FROM ConnectedApplication",
            vec![json!({ "Name": "Data Loader", "OptionsAllowAdminApprovedUsersOnly": false })],
        )
        .with_query("FROM OauthToken", tokens());
    let cache = MetadataCache::new();
    let ctx = ResolveContext {
        connection: &connection,
        cache: &cache,
        events: None,
    };

    let resolution = policy.resolve(&ctx).await;
    let loader = &resolution.resolved_entities["Data Loader"];
    assert!(loader.installed);
    assert_eq!(loader.admin_approved_users_only, Some(false));
    assert_eq!(loader.token_users, 2);

    let workbench = &resolution.resolved_entities["Workbench"];
    assert!(!workbench.installed);
    assert_eq!(workbench.token_users, 1);
    assert!(resolution.ignored_entities.is_empty());
}

#[tokio::test]
async fn missing_optional_field_leaves_policy_unknown() {
    let config = Arc::new(RunConfig::default());
    let policy = connected_apps::policy(
        policy_with_rules(&["NoUserCanSelfAuthorize", "AllUsedAppsUnderManagement"]),
        &config,
    )
    .expect("policy should build");
    let connection = MockConnection::new("00D000000000001")
        .with_describe("ConnectedApplication", &["Name"])
        .with_query("FROM ConnectedApplication", vec![json!({ "Name": "Data Loader" })])
        .with_query("FROM OauthToken", tokens());
    let cache = MetadataCache::new();
    let ctx = ResolveContext {
        connection: &connection,
        cache: &cache,
        events: None,
    };

    let result = policy.run(&ctx).await;
    let self_authorize = &result.executed_rules["NoUserCanSelfAuthorize"];
    assert!(self_authorize.violations.is_empty());
    assert_eq!(self_authorize.warnings.len(), 1);

    let managed = &result.executed_rules["AllUsedAppsUnderManagement"];
    assert_eq!(managed.violations.len(), 1);
    assert_eq!(managed.violated_entities, vec!["Workbench".to_owned()]);
    assert!(!result.is_compliant);
}

#[tokio::test]
async fn failed_token_query_is_reported_as_unavailable_source() {
    let config = Arc::new(RunConfig::default());
    let policy = connected_apps::policy(policy_with_rules(&[]), &config).expect("policy should build");
    let connection = MockConnection::new("00D000000000001")
        .with_query("FROM ConnectedApplication", vec![json!({ "Name": "Data Loader" })])
        .failing_query("FROM OauthToken");
    let cache = MetadataCache::new();
    let ctx = ResolveContext {
        connection: &connection,
        cache: &cache,
        events: None,
    };

    let resolution = policy.resolve(&ctx).await;
    assert_eq!(resolution.resolved_entities.len(), 1);
    assert_eq!(resolution.ignored_entities.len(), 1);
    assert_eq!(resolution.ignored_entities[0].name, "OauthToken");
    assert_eq!(resolution.ignored_entities[0].reason, ResolveFailure::SourceUnavailable);
    assert!(resolution.ignored_entities[0].message.starts_with("OauthToken could not be read"));
}
