//! Settings policy.
//!
//! Rules follow the `Enforce<Group>Settings` naming convention. The groups
//! named by enabled rules are the entities this policy resolves.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{EntityResolver, Policy, Resolution, ResolveContext};
use crate::audit::progress::ResolveProgress;
use crate::config::{ConfigurationError, PolicyConfig, PolicyKind, RunConfig};
use crate::entities::ResolvedSettings;
use crate::result::EntityResolveError;
use crate::rules::enforce_settings::{self, EnforceSettings};
use crate::rules::registry::ConventionFactory;
use crate::rules::ConventionRuleRegistry;

/// Metadata type holding settings documents.
pub const METADATA_TYPE: &str = "Settings";

/// Convention registry for `Enforce<Group>Settings` rules.
///
/// # Errors
///
/// Returns an error if the naming pattern fails to compile.
pub fn registry() -> Result<ConventionRuleRegistry<ResolvedSettings>, ConfigurationError> {
    let registry = ConventionRuleRegistry::new(
        enforce_settings::RULE_PREFIX,
        enforce_settings::RULE_SUFFIX,
        EnforceSettings::factory as ConventionFactory<ResolvedSettings>,
    )?;
    Ok(registry)
}

/// Retrieves the settings groups named by enabled rules.
#[derive(Debug)]
pub struct SettingsResolver {
    groups: Vec<String>,
}

impl SettingsResolver {
    /// Create a resolver for the given settings groups.
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl EntityResolver<ResolvedSettings> for SettingsResolver {
    async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        progress: &ResolveProgress,
    ) -> Resolution<ResolvedSettings> {
        let mut resolution = Resolution::default();
        progress.set_total(self.groups.len());
        if self.groups.is_empty() {
            return resolution;
        }

        match ctx.cache.get_many(ctx.connection, METADATA_TYPE, &self.groups).await {
            Ok(documents) => {
                for group in &self.groups {
                    match documents.get(group) {
                        Some(document) => {
                            resolution.resolved_entities.insert(
                                group.clone(),
                                ResolvedSettings {
                                    name: group.clone(),
                                    values: document.as_ref().clone(),
                                },
                            );
                        }
                        None => resolution
                            .ignored_entities
                            .push(EntityResolveError::not_found(group, "Settings group")),
                    }
                    progress.advance(1);
                }
            }
            Err(e) => {
                warn!(error = %e, "settings retrieve failed");
                for group in &self.groups {
                    resolution
                        .ignored_entities
                        .push(EntityResolveError::metadata_unavailable(group, e.to_string()));
                    progress.advance(1);
                }
            }
        }
        resolution
    }
}

/// Build the settings policy.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] when a rule's options are invalid.
pub fn policy(
    config: PolicyConfig,
    run_config: &Arc<RunConfig>,
) -> Result<Policy<ResolvedSettings>, ConfigurationError> {
    let registry = registry()?;
    let groups = super::sorted_unique(registry.enabled_targets(&config.rules));
    Policy::new(
        PolicyKind::Settings,
        config,
        run_config,
        &registry,
        Box::new(SettingsResolver::new(groups)),
    )
}
