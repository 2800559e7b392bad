//! Installed connected apps must restrict authorization to admin-approved users.

use async_trait::async_trait;

use super::{NoOptions, Rule, RuleContext, RuleInit};
use crate::config::ConfigurationError;
use crate::entities::ResolvedConnectedApp;
use crate::result::{PartialRuleResult, RuleWarning, Violation};

/// Registered rule name.
pub const RULE_NAME: &str = "NoUserCanSelfAuthorize";

/// Flags installed apps that let any user self-authorize.
#[derive(Debug)]
pub struct NoUserCanSelfAuthorize {
    name: String,
}

impl NoUserCanSelfAuthorize {
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
    /// See [`NoUserCanSelfAuthorize::new`].
    pub fn factory(
        init: RuleInit<'_>,
    ) -> Result<Box<dyn Rule<ResolvedConnectedApp>>, ConfigurationError> {
        Ok(Box::new(Self::new(init)?))
    }
}

#[async_trait]
impl Rule<ResolvedConnectedApp> for NoUserCanSelfAuthorize {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RuleContext<'_, ResolvedConnectedApp>) -> PartialRuleResult {
        let mut out = PartialRuleResult::new(&self.name);
        for app in ctx.resolved_entities.values().filter(|a| a.installed) {
            match app.admin_approved_users_only {
                Some(true) => {}
                Some(false) => out.violations.push(
                    Violation::new([app.name.as_str()], "All users may self-authorize the app")
                        .with_hint("Set permitted users to admin approved users are pre-authorized"),
                ),
                None => out.warnings.push(RuleWarning::new(
                    [app.name.as_str()],
                    "Authorization policy of the app could not be determined",
                )),
            }
        }
        out
    }
}
