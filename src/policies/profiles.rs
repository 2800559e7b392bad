//! Profiles policy.

use std::sync::Arc;

use async_trait::async_trait;

use super::{resolve_metadata_holders, EntityResolver, Policy, Resolution, ResolveContext};
use crate::audit::progress::ResolveProgress;
use crate::classification::PrivilegeLevel;
use crate::config::{ConfigurationError, PolicyConfig, PolicyKind, RunConfig};
use crate::entities::ResolvedProfile;
use crate::rules::enforce_permission_classifications::{self, EnforcePermissionClassifications};
use crate::rules::{RuleFactory, StaticRuleRegistry};

/// Metadata type holding profile documents.
pub const METADATA_TYPE: &str = "Profile";

/// Rules available to the profiles policy.
pub fn registry() -> StaticRuleRegistry<ResolvedProfile> {
    StaticRuleRegistry::new(&[(
        enforce_permission_classifications::RULE_NAME,
        EnforcePermissionClassifications::<ResolvedProfile>::factory as RuleFactory<ResolvedProfile>,
    )])
}

/// Resolves classified profiles from their metadata documents.
#[derive(Debug)]
pub struct ProfileResolver {
    run_config: Arc<RunConfig>,
}

impl ProfileResolver {
    /// Create a resolver over the run's profile classifications.
    pub fn new(run_config: Arc<RunConfig>) -> Self {
        Self { run_config }
    }
}

fn build(name: String, privilege_level: PrivilegeLevel, permissions: Vec<String>) -> ResolvedProfile {
    ResolvedProfile {
        name,
        privilege_level,
        permissions,
    }
}

#[async_trait]
impl EntityResolver<ResolvedProfile> for ProfileResolver {
    async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        progress: &ResolveProgress,
    ) -> Resolution<ResolvedProfile> {
        resolve_metadata_holders(
            ctx,
            progress,
            METADATA_TYPE,
            &self.run_config.classifications.profiles,
            build,
        )
        .await
    }
}

/// Build the profiles policy.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] when a rule's options are invalid.
pub fn policy(
    config: PolicyConfig,
    run_config: &Arc<RunConfig>,
) -> Result<Policy<ResolvedProfile>, ConfigurationError> {
    Policy::new(
        PolicyKind::Profiles,
        config,
        run_config,
        &registry(),
        Box::new(ProfileResolver::new(Arc::clone(run_config))),
    )
}
