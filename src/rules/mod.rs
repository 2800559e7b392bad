//! Rules: pure evaluators over one policy's resolved entities.
//!
//! A rule is constructed once from its typed options and is stateless
//! afterwards. It reads the resolved entities, may issue its own remote
//! queries, and reports everything it finds through a
//! [`PartialRuleResult`]. Remote failures become warnings or errors on the
//! result; a rule never fails as a whole.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::{ConfigurationError, PolicyKind, RunConfig};
use crate::connection::Connection;
use crate::result::PartialRuleResult;

pub mod all_used_apps_under_management;
pub mod enforce_permission_classifications;
pub mod enforce_settings;
pub mod no_inactive_users;
pub mod no_other_apex_api_logins;
pub mod no_user_can_self_authorize;
pub mod registry;

pub use registry::{ConventionRuleRegistry, RuleRegistry, RuleResolution, StaticRuleRegistry};

// ---------------------------------------------------------------------------
// Rule contract
// ---------------------------------------------------------------------------

/// Read-only inputs for one rule execution.
pub struct RuleContext<'a, E> {
    /// Remote system under audit.
    pub connection: &'a dyn Connection,
    /// The policy's resolved entities keyed by entity name.
    pub resolved_entities: &'a BTreeMap<String, E>,
}

/// A configured, executable rule.
#[async_trait]
pub trait Rule<E>: Send + Sync
where
    E: Send + Sync,
{
    /// Name the rule was configured under.
    fn name(&self) -> &str;

    /// Evaluate the resolved entities.
    async fn run(&self, ctx: &RuleContext<'_, E>) -> PartialRuleResult;
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Inputs for constructing a rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleInit<'a> {
    /// Shared run configuration.
    pub run_config: &'a Arc<RunConfig>,
    /// Policy the rule belongs to.
    pub policy: PolicyKind,
    /// Configured rule name.
    pub name: &'a str,
    /// Untyped options from configuration.
    pub options: &'a serde_json::Value,
}

impl RuleInit<'_> {
    /// Parse the option bag into the rule's typed options.
    ///
    /// A missing (`null`) option bag yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRuleOptions`] when the options do
    /// not match the rule's option schema.
    pub fn parse_options<T>(&self) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned + Default,
    {
        if self.options.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.options.clone()).map_err(|source| {
            ConfigurationError::InvalidRuleOptions {
                policy: self.policy,
                rule: self.name.to_owned(),
                source,
            }
        })
    }
}

/// Builds a boxed rule from its construction inputs.
pub type RuleFactory<E> = fn(RuleInit<'_>) -> Result<Box<dyn Rule<E>>, ConfigurationError>;

/// Options of rules that take none. Only `null` or `{}` parse.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoOptions {}
