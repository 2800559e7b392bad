//! Inactivity threshold for active users.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{Rule, RuleContext, RuleInit};
use crate::config::ConfigurationError;
use crate::entities::ResolvedUser;
use crate::result::{PartialRuleResult, RuleWarning, Violation};

/// Registered rule name.
pub const RULE_NAME: &str = "NoInactiveUsers";

/// Default inactivity threshold in days.
const DEFAULT_INACTIVE_DAYS: u32 = 90;

/// Options for [`NoInactiveUsers`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NoInactiveUsersOptions {
    /// Days without login after which an active user is a violation.
    pub days_after_user_is_inactive: u32,
}

impl Default for NoInactiveUsersOptions {
    fn default() -> Self {
        Self {
            days_after_user_is_inactive: DEFAULT_INACTIVE_DAYS,
        }
    }
}

/// Flags active users that never logged in or have not logged in recently.
#[derive(Debug)]
pub struct NoInactiveUsers {
    name: String,
    options: NoInactiveUsersOptions,
}

impl NoInactiveUsers {
    /// Construct from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRuleOptions`] when the options do not parse.
    pub fn new(init: RuleInit<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: init.name.to_owned(),
            options: init.parse_options()?,
        })
    }

    /// Boxed factory for registries.
    ///
    /// # Errors
    ///
    /// See [`NoInactiveUsers::new`].
    pub fn factory(init: RuleInit<'_>) -> Result<Box<dyn Rule<ResolvedUser>>, ConfigurationError> {
        Ok(Box::new(Self::new(init)?))
    }

    /// Evaluate one user against the threshold at `now`.
    pub fn evaluate(&self, user: &ResolvedUser, now: DateTime<Utc>, out: &mut PartialRuleResult) {
        let threshold = Duration::days(i64::from(self.options.days_after_user_is_inactive));
        let days = self.options.days_after_user_is_inactive;

        match user.last_login {
            None => match user.created_date {
                Some(created) if now.signed_duration_since(created) > threshold => out.violations.push(
                    Violation::new(
                        [user.username.as_str()],
                        format!("User never logged in and was created more than {days} days ago"),
                    )
                    .with_hint("Deactivate the user"),
                ),
                Some(_) => {}
                None => out.warnings.push(RuleWarning::new(
                    [user.username.as_str()],
                    "User never logged in and has no creation date",
                )),
            },
            Some(last_login) if now.signed_duration_since(last_login) > threshold => {
                let idle = now.signed_duration_since(last_login).num_days();
                out.violations.push(
                    Violation::new(
                        [user.username.as_str()],
                        format!("User has not logged in for {idle} days (threshold {days})"),
                    )
                    .with_hint("Deactivate the user"),
                );
            }
            Some(_) => {}
        }
    }
}

#[async_trait]
impl Rule<ResolvedUser> for NoInactiveUsers {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RuleContext<'_, ResolvedUser>) -> PartialRuleResult {
        let now = Utc::now();
        let mut out = PartialRuleResult::new(&self.name);
        for user in ctx.resolved_entities.values() {
            self.evaluate(user, now, &mut out);
        }
        out
    }
}
