//! Every connected app that users authorize must be installed.

use async_trait::async_trait;

use super::{NoOptions, Rule, RuleContext, RuleInit};
use crate::config::ConfigurationError;
use crate::entities::ResolvedConnectedApp;
use crate::result::{PartialRuleResult, Violation};

/// Registered rule name.
pub const RULE_NAME: &str = "AllUsedAppsUnderManagement";

/// Flags apps with OAuth tokens that are not installed.
#[derive(Debug)]
pub struct AllUsedAppsUnderManagement {
    name: String,
}

impl AllUsedAppsUnderManagement {
    /// Construct from configuration. Accepts no options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRuleOptions`] if any options are given.
    pub fn new(init: RuleInit<'_>) -> Result<Self, ConfigurationError> {
        init.parse_options::<NoOptions>()?;
        Ok(Self {
            name: init.name.to_owned(),
        })
    }

    /// Boxed factory for registries.
    ///
    /// # Errors
    ///
    /// See [`AllUsedAppsUnderManagement::new`].
    pub fn factory(
        init: RuleInit<'_>,
    ) -> Result<Box<dyn Rule<ResolvedConnectedApp>>, ConfigurationError> {
        Ok(Box::new(Self::new(init)?))
    }
}

#[async_trait]
impl Rule<ResolvedConnectedApp> for AllUsedAppsUnderManagement {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RuleContext<'_, ResolvedConnectedApp>) -> PartialRuleResult {
        let mut out = PartialRuleResult::new(&self.name);
        for app in ctx.resolved_entities.values() {
            if !app.installed && app.token_users > 0 {
                out.violations.push(
                    Violation::new(
                        [app.name.as_str()],
                        format!(
                            "App is used by {} users but is not installed",
                            app.token_users
                        ),
                    )
                    .with_hint("Install the connected app to manage its policies"),
                );
            }
        }
        out
    }
}
