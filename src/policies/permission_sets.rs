//! Permission sets policy.

use std::sync::Arc;

use async_trait::async_trait;

use super::{resolve_metadata_holders, EntityResolver, Policy, Resolution, ResolveContext};
use crate::audit::progress::ResolveProgress;
use crate::classification::PrivilegeLevel;
use crate::config::{ConfigurationError, PolicyConfig, PolicyKind, RunConfig};
use crate::entities::ResolvedPermissionSet;
use crate::rules::enforce_permission_classifications::{self, EnforcePermissionClassifications};
use crate::rules::{RuleFactory, StaticRuleRegistry};

/// Metadata type holding permission set documents.
pub const METADATA_TYPE: &str = "PermissionSet";

/// Rules available to the permission sets policy.
pub fn registry() -> StaticRuleRegistry<ResolvedPermissionSet> {
    StaticRuleRegistry::new(&[(
        enforce_permission_classifications::RULE_NAME,
        EnforcePermissionClassifications::<ResolvedPermissionSet>::factory as RuleFactory<ResolvedPermissionSet>,
    )])
}

/// Resolves classified permission sets from their metadata documents.
#[derive(Debug)]
pub struct PermissionSetResolver {
    run_config: Arc<RunConfig>,
}

impl PermissionSetResolver {
    /// Create a resolver over the run's permission set classifications.
    pub fn new(run_config: Arc<RunConfig>) -> Self {
        Self { run_config }
    }
}

fn build(
    name: String,
    privilege_level: PrivilegeLevel,
    permissions: Vec<String>,
) -> ResolvedPermissionSet {
    ResolvedPermissionSet {
        name,
        privilege_level,
        permissions,
    }
}

#[async_trait]
impl EntityResolver<ResolvedPermissionSet> for PermissionSetResolver {
    async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        progress: &ResolveProgress,
    ) -> Resolution<ResolvedPermissionSet> {
        resolve_metadata_holders(
            ctx,
            progress,
            METADATA_TYPE,
            &self.run_config.classifications.permission_sets,
            build,
        )
        .await
    }
}

/// Build the permission sets policy.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] when a rule's options are invalid.
pub fn policy(
    config: PolicyConfig,
    run_config: &Arc<RunConfig>,
) -> Result<Policy<ResolvedPermissionSet>, ConfigurationError> {
    Policy::new(
        PolicyKind::PermissionSets,
        config,
        run_config,
        &registry(),
        Box::new(PermissionSetResolver::new(Arc::clone(run_config))),
    )
}
