//! Classification preset enforcement.
//!
//! Every permission an entity grants is looked up in the permission
//! classifications and compared against the entity's privilege level.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{NoOptions, Rule, RuleContext, RuleInit};
use crate::classification::{allowed, RiskLevel};
use crate::config::{ConfigurationError, RunConfig};
use crate::entities::PermissionHolder;
use crate::result::{PartialRuleResult, RuleWarning, Violation};

/// Registered rule name.
pub const RULE_NAME: &str = "EnforcePermissionClassifications";

/// Flags permissions that exceed the privilege of the entity granting them.
pub struct EnforcePermissionClassifications<E> {
    name: String,
    run_config: Arc<RunConfig>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> EnforcePermissionClassifications<E>
where
    E: PermissionHolder + 'static,
{
    /// Construct from configuration. Accepts no options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRuleOptions`] if any options are given.
    pub fn new(init: RuleInit<'_>) -> Result<Self, ConfigurationError> {
        init.parse_options::<NoOptions>()?;
        Ok(Self {
            name: init.name.to_owned(),
            run_config: Arc::clone(init.run_config),
            _entity: PhantomData,
        })
    }

    /// Boxed factory for registries.
    ///
    /// # Errors
    ///
    /// See [`EnforcePermissionClassifications::new`].
    pub fn factory(init: RuleInit<'_>) -> Result<Box<dyn Rule<E>>, ConfigurationError> {
        Ok(Box::new(Self::new(init)?))
    }

    fn evaluate(&self, entity: &E, out: &mut PartialRuleResult) {
        let classifications = &self.run_config.classifications.permissions;
        let privilege = entity.privilege_level();

        for permission in entity.granted_permissions() {
            let identifier = [entity.name(), permission.as_str()];
            let Some(classification) = classifications.get(permission) else {
                out.warnings.push(RuleWarning::new(
                    identifier,
                    format!("Permission {permission} is not classified"),
                ));
                continue;
            };

            match classification.risk_level {
                RiskLevel::Blocked => out.violations.push(
                    Violation::new(identifier, format!("Permission {permission} is blocked"))
                        .with_hint("Remove the permission"),
                ),
                RiskLevel::Unknown => out.warnings.push(RuleWarning::new(
                    identifier,
                    format!("Permission {permission} is classified with risk level UNKNOWN"),
                )),
                risk if !allowed(risk, privilege) => out.violations.push(
                    Violation::new(
                        identifier,
                        format!(
                            "Permission {permission} is rated {risk}, which exceeds privilege level {privilege}"
                        ),
                    )
                    .with_hint(match &classification.reason {
                        Some(reason) => format!("Remove the permission or raise the privilege level ({reason})"),
                        None => "Remove the permission or raise the privilege level".to_owned(),
                    }),
                ),
                _ => {}
            }
        }
    }
}

#[async_trait]
impl<E> Rule<E> for EnforcePermissionClassifications<E>
where
    E: PermissionHolder + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RuleContext<'_, E>) -> PartialRuleResult {
        let mut out = PartialRuleResult::new(&self.name);
        for entity in ctx.resolved_entities.values() {
            self.evaluate(entity, &mut out);
        }
        debug!(
            rule = %self.name,
            entities = ctx.resolved_entities.len(),
            violations = out.violations.len(),
            warnings = out.warnings.len(),
            "permission classifications evaluated"
        );
        out
    }
}
