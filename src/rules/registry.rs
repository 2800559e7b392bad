//! Rule registries: turn a policy's configured rule map into executable
//! rules.
//!
//! Every registry partitions the configured names three ways: enabled rules
//! (instantiated), skipped rules (switched off or not applicable) and
//! resolve errors (nothing to instantiate). Only invalid options are fatal.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use super::{Rule, RuleFactory, RuleInit};
use crate::config::{ConfigurationError, PolicyKind, RuleConfig, RunConfig};
use crate::result::{RuleResolveError, SkippedRule};

/// Reason recorded for rules switched off in configuration.
pub const DISABLED_REASON: &str = "rule is disabled in configuration";

/// The three-way partition of a policy's configured rules.
pub struct RuleResolution<E> {
    /// Instantiated rules that will execute.
    pub enabled_rules: Vec<Box<dyn Rule<E>>>,
    /// Configured rules that will not execute.
    pub skipped_rules: Vec<SkippedRule>,
    /// Configured rule names that could not be resolved.
    pub resolve_errors: Vec<RuleResolveError>,
}

impl<E> Default for RuleResolution<E> {
    fn default() -> Self {
        Self {
            enabled_rules: Vec::new(),
            skipped_rules: Vec::new(),
            resolve_errors: Vec::new(),
        }
    }
}

impl<E: Send + Sync> std::fmt::Debug for RuleResolution<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.enabled_rules.iter().map(|r| r.name()).collect();
        f.debug_struct("RuleResolution")
            .field("enabled_rules", &names)
            .field("skipped_rules", &self.skipped_rules)
            .field("resolve_errors", &self.resolve_errors)
            .finish()
    }
}

/// Resolves configured rule names into executable rules.
pub trait RuleRegistry<E>: Send + Sync {
    /// Partition the configured rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRuleOptions`] when an enabled
    /// rule's options do not parse.
    fn resolve_rules(
        &self,
        policy: PolicyKind,
        configured: &BTreeMap<String, RuleConfig>,
        run_config: &Arc<RunConfig>,
    ) -> Result<RuleResolution<E>, ConfigurationError>;
}

// ---------------------------------------------------------------------------
// StaticRuleRegistry
// ---------------------------------------------------------------------------

/// Registry with a fixed name-to-factory table.
pub struct StaticRuleRegistry<E> {
    factories: BTreeMap<&'static str, RuleFactory<E>>,
}

impl<E> StaticRuleRegistry<E> {
    /// Create a registry from `(name, factory)` pairs.
    pub fn new(entries: &[(&'static str, RuleFactory<E>)]) -> Self {
        Self {
            factories: entries.iter().copied().collect(),
        }
    }

    /// Registered rule names.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl<E> RuleRegistry<E> for StaticRuleRegistry<E>
where
    E: Send + Sync + 'static,
{
    fn resolve_rules(
        &self,
        policy: PolicyKind,
        configured: &BTreeMap<String, RuleConfig>,
        run_config: &Arc<RunConfig>,
    ) -> Result<RuleResolution<E>, ConfigurationError> {
        let mut resolution = RuleResolution::default();

        for (name, rule_config) in configured {
            let Some(factory) = self.factories.get(name.as_str()) else {
                debug!(%policy, rule = %name, "configured rule is not registered");
                resolution.resolve_errors.push(RuleResolveError {
                    name: name.clone(),
                    message: format!("rule {name} is not registered for policy {policy}"),
                });
                continue;
            };

            if !rule_config.enabled {
                resolution.skipped_rules.push(SkippedRule {
                    name: name.clone(),
                    reason: DISABLED_REASON.to_owned(),
                });
                continue;
            }

            let rule = factory(RuleInit {
                run_config,
                policy,
                name,
                options: &rule_config.options,
            })?;
            resolution.enabled_rules.push(rule);
        }

        Ok(resolution)
    }
}

// ---------------------------------------------------------------------------
// ConventionRuleRegistry
// ---------------------------------------------------------------------------

/// Builds one generic rule for a target named inside the rule name.
pub type ConventionFactory<E> =
    fn(&str, RuleInit<'_>) -> Result<Box<dyn Rule<E>>, ConfigurationError>;

/// Registry that matches rule names against a naming convention.
///
/// The pattern must capture the target in a group named `target`. Names that
/// do not follow the convention are skipped, not errors.
pub struct ConventionRuleRegistry<E> {
    pattern: Regex,
    convention: String,
    factory: ConventionFactory<E>,
}

impl<E> ConventionRuleRegistry<E> {
    /// Create a registry for names shaped `{prefix}<Target>{suffix}`.
    ///
    /// # Errors
    ///
    /// Returns an error if prefix and suffix do not form a valid pattern.
    pub fn new(
        prefix: &str,
        suffix: &str,
        factory: ConventionFactory<E>,
    ) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            "^{}(?P<target>[A-Za-z][A-Za-z0-9]*){}$",
            regex::escape(prefix),
            regex::escape(suffix)
        ))?;
        Ok(Self {
            pattern,
            convention: format!("{prefix}<Name>{suffix}"),
            factory,
        })
    }

    /// Extract the target from a rule name, if it follows the convention.
    pub fn target<'n>(&self, rule_name: &'n str) -> Option<&'n str> {
        self.pattern
            .captures(rule_name)
            .and_then(|c| c.name("target"))
            .map(|m| m.as_str())
    }

    /// Targets of all enabled, convention-conforming rules.
    pub fn enabled_targets(&self, configured: &BTreeMap<String, RuleConfig>) -> Vec<String> {
        configured
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .filter_map(|(name, _)| self.target(name).map(str::to_owned))
            .collect()
    }
}

impl<E> RuleRegistry<E> for ConventionRuleRegistry<E>
where
    E: Send + Sync + 'static,
{
    fn resolve_rules(
        &self,
        policy: PolicyKind,
        configured: &BTreeMap<String, RuleConfig>,
        run_config: &Arc<RunConfig>,
    ) -> Result<RuleResolution<E>, ConfigurationError> {
        let mut resolution = RuleResolution::default();

        for (name, rule_config) in configured {
            let Some(target) = self.target(name) else {
                resolution.skipped_rules.push(SkippedRule {
                    name: name.clone(),
                    reason: format!("rule name does not follow the convention {}", self.convention),
                });
                continue;
            };

            if !rule_config.enabled {
                resolution.skipped_rules.push(SkippedRule {
                    name: name.clone(),
                    reason: DISABLED_REASON.to_owned(),
                });
                continue;
            }

            let rule = (self.factory)(
                target,
                RuleInit {
                    run_config,
                    policy,
                    name,
                    options: &rule_config.options,
                },
            )?;
            resolution.enabled_rules.push(rule);
        }

        Ok(resolution)
    }
}
