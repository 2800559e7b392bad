//! Settings policy: convention rules select the groups to retrieve.

use std::sync::Arc;

use serde_json::json;

use orgaudit::config::{PolicyConfig, RuleConfig, RunConfig};
use orgaudit::connection::MetadataCache;
use orgaudit::policies::{settings, ResolveContext};
use orgaudit::result::ResolveFailure;

use crate::support::MockConnection;

fn policy_config() -> PolicyConfig {
    let mut config = PolicyConfig::default();
    config.rules.insert(
        "EnforceSessionSettings".to_owned(),
        RuleConfig::with_options(json!({ "lockSessionsToIp": true })),
    );
    config.rules.insert(
        "EnforcePasswordPolicySettings".to_owned(),
        RuleConfig::with_options(json!({ "minimumPasswordLength": 12 })),
    );
    config
        .rules
        .insert("EnforceApexSettings".to_owned(), RuleConfig::disabled());
    config
}

#[tokio::test]
async fn retrieves_only_enabled_groups() {
    let config = Arc::new(RunConfig::default());
    let policy = settings::policy(policy_config(), &config).expect("policy should build");
    let connection = MockConnection::new("00D000000000001")
        .with_metadata("Settings", "Session", json!({ "lockSessionsToIp": "false" }));
    let cache = MetadataCache::new();
    let ctx = ResolveContext {
        connection: &connection,
        cache: &cache,
        events: None,
    };

    let result = policy.run(&ctx).await;

    let retrieved = connection.retrieved_names.lock().expect("test lock").clone();
    assert_eq!(
        retrieved,
        vec![(
            "Settings".to_owned(),
            vec!["PasswordPolicy".to_owned(), "Session".to_owned()]
        )]
    );

    assert_eq!(result.audited_entities, vec!["Session".to_owned()]);
    assert_eq!(result.ignored_entities.len(), 1);
    assert_eq!(result.ignored_entities[0].name, "PasswordPolicy");
    assert_eq!(result.ignored_entities[0].reason, ResolveFailure::NotFound);

    let session = &result.executed_rules["EnforceSessionSettings"];
    assert_eq!(session.violations.len(), 1);
    assert_eq!(session.violated_entities, vec!["Session".to_owned()]);

    let password = &result.executed_rules["EnforcePasswordPolicySettings"];
    assert!(password.is_compliant);
    assert!(password.compliant_entities.is_empty());
    assert!(password.violated_entities.is_empty());

    assert_eq!(result.skipped_rules.len(), 1);
    assert_eq!(result.skipped_rules[0].name, "EnforceApexSettings");
    assert!(!result.is_compliant);
}
