//! Detects users authenticating through the legacy "Other Apex API" login type.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{Rule, RuleContext, RuleInit};
use crate::config::ConfigurationError;
use crate::connection::{record_str, ConnectionError};
use crate::entities::ResolvedUser;
use crate::result::{PartialRuleResult, RuleError, Violation};

/// Registered rule name.
pub const RULE_NAME: &str = "NoOtherApexApiLogins";

/// Default lookback window in days.
const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Options for [`NoOtherApexApiLogins`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NoOtherApexApiLoginsOptions {
    /// How many days of login history to inspect.
    pub lookback_days: u32,
}

impl Default for NoOtherApexApiLoginsOptions {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// Flags users with recent "Other Apex API" logins.
#[derive(Debug)]
pub struct NoOtherApexApiLogins {
    name: String,
    options: NoOtherApexApiLoginsOptions,
}

impl NoOtherApexApiLogins {
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
    /// See [`NoOtherApexApiLogins::new`].
    pub fn factory(init: RuleInit<'_>) -> Result<Box<dyn Rule<ResolvedUser>>, ConfigurationError> {
        Ok(Box::new(Self::new(init)?))
    }

    /// Login history query for the configured window.
    pub fn login_history_query(&self) -> String {
        format!(
            "SELECT UserId, LoginType FROM LoginHistory \
             WHERE LoginType = 'Other Apex API' AND LoginTime = LAST_N_DAYS:{}",
            self.options.lookback_days
        )
    }

    async fn count_logins(
        &self,
        ctx: &RuleContext<'_, ResolvedUser>,
    ) -> Result<BTreeMap<String, usize>, ConnectionError> {
        let records = ctx.connection.query(&self.login_history_query()).await?;
        let mut counts = BTreeMap::new();
        for record in &records {
            if let Some(user_id) = record_str(record, "UserId") {
                let count = counts.entry(user_id.to_owned()).or_insert(0_usize);
                *count = count.saturating_add(1);
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl Rule<ResolvedUser> for NoOtherApexApiLogins {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RuleContext<'_, ResolvedUser>) -> PartialRuleResult {
        let mut out = PartialRuleResult::new(&self.name);

        let counts = match self.count_logins(ctx).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(rule = %self.name, error = %e, "login history unavailable");
                out.errors.push(RuleError {
                    name: "LoginHistory".to_owned(),
                    message: e.to_string(),
                });
                return out;
            }
        };

        let days = self.options.lookback_days;
        for user in ctx.resolved_entities.values() {
            if let Some(count) = counts.get(&user.id) {
                out.violations.push(
                    Violation::new(
                        [user.username.as_str()],
                        format!("User logged in {count} times via Other Apex API in the last {days} days"),
                    )
                    .with_hint("Migrate the integration to OAuth"),
                );
            }
        }
        out
    }
}
