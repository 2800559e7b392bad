//! Policies: one audit domain each.
//!
//! A [`Policy`] owns its domain's entity resolution and rule execution.
//! Resolution is a pluggable [`EntityResolver`] strategy; everything else
//! (memoized resolve, concurrent rule execution, result assembly) is shared.
//! The orchestrator drives policies through the object-safe [`AuditPolicy`]
//! trait so policies over different entity types can run side by side.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::audit::progress::{AuditEvent, ResolveProgress};
use crate::classification::{EntityClassification, PrivilegeLevel};
use crate::config::{ConfigurationError, PolicyConfig, PolicyKind, RunConfig};
use crate::connection::{Connection, MetadataCache};
use crate::result::{EntityResolveError, PolicyResult, RuleResult};
use crate::rules::{RuleContext, RuleRegistry, RuleResolution};

pub mod connected_apps;
pub mod permission_sets;
pub mod profiles;
pub mod settings;
pub mod users;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Shared inputs for resolving and running policies.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Remote system under audit.
    pub connection: &'a dyn Connection,
    /// Run-scoped metadata cache shared by all policies.
    pub cache: &'a MetadataCache,
    /// Progress channel, if anyone listens.
    pub events: Option<&'a UnboundedSender<AuditEvent>>,
}

/// Entities a policy resolved, and classification entries it could not.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<E> {
    /// Entity name to resolved entity.
    pub resolved_entities: BTreeMap<String, E>,
    /// Entries that could not be evaluated.
    pub ignored_entities: Vec<EntityResolveError>,
}

impl<E> Default for Resolution<E> {
    fn default() -> Self {
        Self {
            resolved_entities: BTreeMap::new(),
            ignored_entities: Vec::new(),
        }
    }
}

/// Domain-specific resolution strategy.
///
/// Implementations cross-reference remote entities with their
/// classification. Remote failures become ignored entities, never errors.
#[async_trait]
pub trait EntityResolver<E>: Send + Sync {
    /// Resolve the domain's entities, reporting progress as they complete.
    async fn resolve(&self, ctx: &ResolveContext<'_>, progress: &ResolveProgress) -> Resolution<E>;
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// A policy over entities of type `E`.
pub struct Policy<E> {
    kind: PolicyKind,
    config: PolicyConfig,
    rules: RuleResolution<E>,
    resolver: Box<dyn EntityResolver<E>>,
    resolved: OnceCell<Resolution<E>>,
}

impl<E: Send + Sync> std::fmt::Debug for Policy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("kind", &self.kind)
            .field("enabled", &self.config.enabled)
            .field("rules", &self.rules)
            .field("resolved", &self.resolved.initialized())
            .finish()
    }
}

impl<E> Policy<E>
where
    E: Send + Sync + 'static,
{
    /// Create a policy, resolving its rule set up front.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRuleOptions`] when a configured
    /// rule's options do not parse.
    pub fn new(
        kind: PolicyKind,
        config: PolicyConfig,
        run_config: &Arc<RunConfig>,
        registry: &dyn RuleRegistry<E>,
        resolver: Box<dyn EntityResolver<E>>,
    ) -> Result<Self, ConfigurationError> {
        let rules = registry.resolve_rules(kind, &config.rules, run_config)?;
        debug!(
            policy = %kind,
            enabled = rules.enabled_rules.len(),
            skipped = rules.skipped_rules.len(),
            unresolved = rules.resolve_errors.len(),
            "policy rules resolved"
        );
        Ok(Self {
            kind,
            config,
            rules,
            resolver,
            resolved: OnceCell::new(),
        })
    }

    /// Domain of this policy.
    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Whether the policy is switched on.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The resolved rule partition.
    pub fn rules(&self) -> &RuleResolution<E> {
        &self.rules
    }

    /// Resolve entities once; later and concurrent calls share the result.
    ///
    /// A disabled policy resolves to nothing without touching the remote
    /// system.
    pub async fn resolve(&self, ctx: &ResolveContext<'_>) -> &Resolution<E> {
        self.resolved
            .get_or_init(|| async {
                if !self.config.enabled {
                    return Resolution::default();
                }
                let progress = ResolveProgress::new(self.kind, ctx.events);
                let resolution = self.resolver.resolve(ctx, &progress).await;
                progress.finish();
                info!(
                    policy = %self.kind,
                    resolved = resolution.resolved_entities.len(),
                    ignored = resolution.ignored_entities.len(),
                    "policy entities resolved"
                );
                resolution
            })
            .await
    }

    /// Resolve (if needed) and run all enabled rules concurrently.
    pub async fn run(&self, ctx: &ResolveContext<'_>) -> PolicyResult {
        if !self.config.enabled {
            return PolicyResult::disabled();
        }

        let resolution = self.resolve(ctx).await;
        let rule_ctx = RuleContext {
            connection: ctx.connection,
            resolved_entities: &resolution.resolved_entities,
        };

        let partials = join_all(
            self.rules
                .enabled_rules
                .iter()
                .map(|rule| rule.run(&rule_ctx)),
        )
        .await;

        let executed_rules: BTreeMap<String, RuleResult> = partials
            .into_iter()
            .map(|partial| {
                let result = RuleResult::complete(partial, resolution.resolved_entities.keys());
                (result.rule_name.clone(), result)
            })
            .collect();

        let mut result = PolicyResult {
            enabled: true,
            is_compliant: true,
            executed_rules,
            skipped_rules: self.rules.skipped_rules.clone(),
            rule_resolve_errors: self.rules.resolve_errors.clone(),
            audited_entities: resolution.resolved_entities.keys().cloned().collect(),
            ignored_entities: resolution.ignored_entities.clone(),
        };
        result.refresh_compliance();

        info!(
            policy = %self.kind,
            rules = result.executed_rules.len(),
            compliant = result.is_compliant,
            "policy executed"
        );
        result
    }
}

// ---------------------------------------------------------------------------
// Object-safe policy handle
// ---------------------------------------------------------------------------

/// Counts reported after resolving a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Resolved entity count.
    pub resolved: usize,
    /// Ignored entity count.
    pub ignored: usize,
}

/// Type-erased policy driven by the orchestrator.
#[async_trait]
pub trait AuditPolicy: Send + Sync {
    /// Domain of this policy.
    fn kind(&self) -> PolicyKind;

    /// Whether the policy is switched on.
    fn is_enabled(&self) -> bool;

    /// Resolve entities (memoized).
    async fn resolve_entities(&self, ctx: &ResolveContext<'_>) -> ResolveSummary;

    /// Run the policy's rules.
    async fn execute(&self, ctx: &ResolveContext<'_>) -> PolicyResult;
}

#[async_trait]
impl<E> AuditPolicy for Policy<E>
where
    E: Send + Sync + 'static,
{
    fn kind(&self) -> PolicyKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn resolve_entities(&self, ctx: &ResolveContext<'_>) -> ResolveSummary {
        let resolution = self.resolve(ctx).await;
        ResolveSummary {
            resolved: resolution.resolved_entities.len(),
            ignored: resolution.ignored_entities.len(),
        }
    }

    async fn execute(&self, ctx: &ResolveContext<'_>) -> PolicyResult {
        self.run(ctx).await
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Instantiate one policy per configured entry.
///
/// # Errors
///
/// Returns the first [`ConfigurationError`] raised while resolving rules.
pub fn build_policies(
    run_config: &Arc<RunConfig>,
) -> Result<Vec<Box<dyn AuditPolicy>>, ConfigurationError> {
    let mut policies: Vec<Box<dyn AuditPolicy>> = Vec::with_capacity(run_config.policies.len());
    for (kind, config) in &run_config.policies {
        let config = config.clone();
        let policy: Box<dyn AuditPolicy> = match kind {
            PolicyKind::Profiles => Box::new(profiles::policy(config, run_config)?),
            PolicyKind::PermissionSets => Box::new(permission_sets::policy(config, run_config)?),
            PolicyKind::Users => Box::new(users::policy(config, run_config)?),
            PolicyKind::ConnectedApps => Box::new(connected_apps::policy(config, run_config)?),
            PolicyKind::Settings => Box::new(settings::policy(config, run_config)?),
        };
        policies.push(policy);
    }
    Ok(policies)
}

/// Sort `names`, drop duplicates.
pub(crate) fn sorted_unique(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names.dedup();
    names
}

/// Names of enabled permissions in a metadata document's `userPermissions`.
pub(crate) fn enabled_permissions(document: &serde_json::Value) -> Vec<String> {
    let Some(entries) = document.get("userPermissions").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    let names = entries
        .iter()
        .filter(|entry| match entry.get("enabled") {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "true",
            _ => false,
        })
        .filter_map(|entry| entry.get("name").and_then(|n| n.as_str()))
        .map(str::to_owned)
        .collect();
    sorted_unique(names)
}

/// Resolve classified entities whose permissions live in metadata documents.
///
/// Entities classified UNKNOWN are ignored without fetching; the rest are
/// fetched in one bulk retrieve through the shared cache.
pub(crate) async fn resolve_metadata_holders<E>(
    ctx: &ResolveContext<'_>,
    progress: &ResolveProgress,
    metadata_type: &str,
    classified: &BTreeMap<String, EntityClassification>,
    build: fn(String, PrivilegeLevel, Vec<String>) -> E,
) -> Resolution<E> {
    let mut resolution = Resolution::default();
    progress.set_total(classified.len());

    let mut names = Vec::with_capacity(classified.len());
    for (name, classification) in classified {
        if classification.privilege_level == PrivilegeLevel::Unknown {
            resolution
                .ignored_entities
                .push(EntityResolveError::privilege_unknown(name, metadata_type));
            progress.advance(1);
        } else {
            names.push(name.clone());
        }
    }
    if names.is_empty() {
        return resolution;
    }

    match ctx.cache.get_many(ctx.connection, metadata_type, &names).await {
        Ok(documents) => {
            for name in names {
                match documents.get(&name) {
                    Some(document) => {
                        let privilege = classified[&name].privilege_level;
                        let entity = build(name.clone(), privilege, enabled_permissions(document));
                        resolution.resolved_entities.insert(name, entity);
                    }
                    None => resolution
                        .ignored_entities
                        .push(EntityResolveError::not_found(name, metadata_type)),
                }
                progress.advance(1);
            }
        }
        Err(e) => {
            warn!(metadata_type, error = %e, "metadata retrieve failed");
            let message = e.to_string();
            for name in names {
                resolution
                    .ignored_entities
                    .push(EntityResolveError::metadata_unavailable(name, message.clone()));
                progress.advance(1);
            }
        }
    }
    resolution
}
