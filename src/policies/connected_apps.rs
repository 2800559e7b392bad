//! Connected apps policy.
//!
//! Entities are all installed apps plus every app users hold OAuth tokens
//! for. Installed apps are not classified, so nothing is ignored for lack
//! of a classification. A failed query is reported as an ignored entry
//! named after the object that could not be read, with reason
//! `sourceUnavailable` so renderers can tell it apart from an entity.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{EntityResolver, Policy, Resolution, ResolveContext};
use crate::audit::progress::ResolveProgress;
use crate::config::{ConfigurationError, PolicyConfig, PolicyKind, RunConfig};
use crate::connection::{record_bool, record_str};
use crate::entities::ResolvedConnectedApp;
use crate::result::EntityResolveError;
use crate::rules::all_used_apps_under_management::{self, AllUsedAppsUnderManagement};
use crate::rules::no_user_can_self_authorize::{self, NoUserCanSelfAuthorize};
use crate::rules::{RuleFactory, StaticRuleRegistry};

/// Object type of installed connected apps.
pub const APPS_OBJECT: &str = "ConnectedApplication";

/// Field exposing the admin-approved-users-only policy. Not present on every
/// platform version.
pub const ADMIN_APPROVED_FIELD: &str = "OptionsAllowAdminApprovedUsersOnly";

/// OAuth token usage.
pub const TOKENS_QUERY: &str = "SELECT AppName, UserId FROM OauthToken";

/// Object holding per-user OAuth tokens.
pub const TOKENS_OBJECT: &str = "OauthToken";

/// Rules available to the connected apps policy.
pub fn registry() -> StaticRuleRegistry<ResolvedConnectedApp> {
    StaticRuleRegistry::new(&[
        (
            all_used_apps_under_management::RULE_NAME,
            AllUsedAppsUnderManagement::factory as RuleFactory<ResolvedConnectedApp>,
        ),
        (
            no_user_can_self_authorize::RULE_NAME,
            NoUserCanSelfAuthorize::factory as RuleFactory<ResolvedConnectedApp>,
        ),
    ])
}

/// Resolves installed and used connected apps.
#[derive(Debug, Default)]
pub struct ConnectedAppResolver;

impl ConnectedAppResolver {
    /// Build the apps query, selecting the admin-approved field only when the
    /// platform exposes it.
    async fn apps_query(&self, ctx: &ResolveContext<'_>) -> String {
        let with_policy = match ctx.connection.describe(APPS_OBJECT).await {
            Ok(describe) => describe.has_field(ADMIN_APPROVED_FIELD),
            Err(e) => {
                warn!(error = %e, "describe failed, omitting optional app fields");
                false
            }
        };
        if with_policy {
            format!("SELECT Name, {ADMIN_APPROVED_FIELD} FROM {APPS_OBJECT}")
        } else {
            format!("SELECT Name FROM {APPS_OBJECT}")
        }
    }
}

#[async_trait]
impl EntityResolver<ResolvedConnectedApp> for ConnectedAppResolver {
    async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        progress: &ResolveProgress,
    ) -> Resolution<ResolvedConnectedApp> {
        let mut resolution = Resolution::default();

        let apps_query = self.apps_query(ctx).await;
        let (apps, tokens) = futures::join!(
            ctx.connection.query(&apps_query),
            ctx.connection.query(TOKENS_QUERY)
        );

        let mut entities: BTreeMap<String, ResolvedConnectedApp> = BTreeMap::new();
        match apps {
            Ok(records) => {
                for record in &records {
                    let Some(name) = record_str(record, "Name") else {
                        continue;
                    };
                    entities.insert(
                        name.to_owned(),
                        ResolvedConnectedApp {
                            name: name.to_owned(),
                            installed: true,
                            admin_approved_users_only: record_bool(record, ADMIN_APPROVED_FIELD),
                            token_users: 0,
                        },
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "installed connected apps unavailable");
                resolution
                    .ignored_entities
                    .push(EntityResolveError::source_unavailable(APPS_OBJECT, e.to_string()));
            }
        }

        match tokens {
            Ok(records) => {
                let mut users_by_app: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
                for record in &records {
                    if let Some(app) = record_str(record, "AppName") {
                        let users = users_by_app.entry(app).or_default();
                        if let Some(user) = record_str(record, "UserId") {
                            users.insert(user);
                        }
                    }
                }
                for (app, users) in users_by_app {
                    entities
                        .entry(app.to_owned())
                        .or_insert_with(|| ResolvedConnectedApp {
                            name: app.to_owned(),
                            installed: false,
                            admin_approved_users_only: None,
                            token_users: 0,
                        })
                        .token_users = users.len();
                }
            }
            Err(e) => {
                warn!(error = %e, "oauth token usage unavailable");
                resolution
                    .ignored_entities
                    .push(EntityResolveError::source_unavailable(TOKENS_OBJECT, e.to_string()));
            }
        }

        progress.set_total(entities.len());
        progress.advance(entities.len());
        resolution.resolved_entities = entities;
        resolution
    }
}

/// Build the connected apps policy.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] when a rule's options are invalid.
pub fn policy(
    config: PolicyConfig,
    run_config: &Arc<RunConfig>,
) -> Result<Policy<ResolvedConnectedApp>, ConfigurationError> {
    Policy::new(
        PolicyKind::ConnectedApps,
        config,
        run_config,
        &registry(),
        Box::new(ConnectedAppResolver),
    )
}
