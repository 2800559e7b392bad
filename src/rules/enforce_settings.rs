//! Structural settings diff.
//!
//! Rules named `Enforce<Group>Settings` carry the expected settings tree as
//! their options. The tree is compared one-directionally against the
//! retrieved settings group: keys only present remotely are never flagged.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Rule, RuleContext, RuleInit};
use crate::config::ConfigurationError;
use crate::entities::ResolvedSettings;
use crate::result::{PartialRuleResult, RuleWarning, Violation};

/// Rule name prefix of the settings convention.
pub const RULE_PREFIX: &str = "Enforce";

/// Rule name suffix of the settings convention.
pub const RULE_SUFFIX: &str = "Settings";

/// Compares one settings group against an expected tree.
#[derive(Debug)]
pub struct EnforceSettings {
    name: String,
    group: String,
    expected: Map<String, Value>,
}

impl EnforceSettings {
    /// Construct for a settings group. The options are the expected tree.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRuleOptions`] when the options
    /// are not an object.
    pub fn new(group: &str, init: RuleInit<'_>) -> Result<Self, ConfigurationError> {
        let expected: Map<String, Value> = init.parse_options()?;
        Ok(Self {
            name: init.name.to_owned(),
            group: group.to_owned(),
            expected,
        })
    }

    /// Boxed factory for the convention registry.
    ///
    /// # Errors
    ///
    /// See [`EnforceSettings::new`].
    pub fn factory(
        group: &str,
        init: RuleInit<'_>,
    ) -> Result<Box<dyn Rule<ResolvedSettings>>, ConfigurationError> {
        Ok(Box::new(Self::new(group, init)?))
    }

    /// Settings group this rule audits.
    pub fn group(&self) -> &str {
        &self.group
    }
}

/// Recursively compare `expected` against `actual`, appending findings.
///
/// `path` holds the identifier segments of the current level and starts with
/// the settings group name.
pub fn diff_settings(
    expected: &Map<String, Value>,
    actual: &Map<String, Value>,
    path: &mut Vec<String>,
    out: &mut PartialRuleResult,
) {
    for (key, expected_value) in expected {
        path.push(key.clone());
        match (expected_value, actual.get(key)) {
            (_, None) => out.warnings.push(RuleWarning::new(
                path.iter().cloned(),
                format!("Setting {key} was not found on the target system"),
            )),
            (Value::Object(expected_child), Some(Value::Object(actual_child))) => {
                diff_settings(expected_child, actual_child, path, out);
            }
            (Value::Object(_), Some(actual_value)) => out.violations.push(Violation::new(
                path.iter().cloned(),
                format!("Expected {key} to be a settings group, but found {}", scalar_text(actual_value)),
            )),
            (expected_value, Some(actual_value)) => {
                let expected_text = scalar_text(expected_value);
                let actual_text = scalar_text(actual_value);
                if expected_text != actual_text {
                    out.violations.push(
                        Violation::new(
                            path.iter().cloned(),
                            format!("Expected {key} to be {expected_text}, but found {actual_text}"),
                        )
                        .with_hint(format!("Set {key} to {expected_text}")),
                    );
                }
            }
        }
        path.pop();
    }
}

/// Textual form of a value; metadata documents carry scalars as strings.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Rule<ResolvedSettings> for EnforceSettings {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RuleContext<'_, ResolvedSettings>) -> PartialRuleResult {
        let mut out = PartialRuleResult::new(&self.name);
        // Unretrievable groups are already reported as ignored entities.
        let Some(settings) = ctx.resolved_entities.get(&self.group) else {
            out.compliant_entities = Some(Vec::new());
            out.violated_entities = Some(Vec::new());
            return out;
        };

        let empty = Map::new();
        let actual = settings.values.as_object().unwrap_or(&empty);
        let mut path = vec![self.group.clone()];
        diff_settings(&self.expected, actual, &mut path, &mut out);

        let entities = vec![self.group.clone()];
        if out.violations.is_empty() {
            out.compliant_entities = Some(entities);
            out.violated_entities = Some(Vec::new());
        } else {
            out.compliant_entities = Some(Vec::new());
            out.violated_entities = Some(entities);
        }
        out
    }
}
