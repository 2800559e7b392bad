//! Users policy.
//!
//! Audits every active user on the target system. A user's effective
//! permissions are the union of its profile's and its assigned permission
//! sets' permissions; the documents come from the run's shared metadata
//! cache, so profiles and permission sets audited by their own policies are
//! fetched only once.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{enabled_permissions, sorted_unique, EntityResolver, Policy, Resolution, ResolveContext};
use crate::audit::progress::ResolveProgress;
use crate::classification::PrivilegeLevel;
use crate::config::{ConfigurationError, PolicyConfig, PolicyKind, RunConfig};
use crate::connection::{record_str, ConnectionError, Record};
use crate::entities::ResolvedUser;
use crate::policies::{permission_sets, profiles};
use crate::result::EntityResolveError;
use crate::rules::enforce_permission_classifications::{self, EnforcePermissionClassifications};
use crate::rules::no_inactive_users::{self, NoInactiveUsers};
use crate::rules::no_other_apex_api_logins::{self, NoOtherApexApiLogins};
use crate::rules::{RuleFactory, StaticRuleRegistry};

/// Active users with their profile and login timestamps.
pub const USERS_QUERY: &str = "SELECT Id, Username, LastLoginDate, CreatedDate, Profile.Name \
     FROM User WHERE IsActive = true";

/// Permission sets assigned to active users, excluding profile-owned sets.
pub const ASSIGNMENTS_QUERY: &str = "SELECT AssigneeId, PermissionSet.Name \
     FROM PermissionSetAssignment \
     WHERE PermissionSet.IsOwnedByProfile = false AND Assignee.IsActive = true";

const ENTITY_KIND: &str = "User";

/// Rules available to the users policy.
pub fn registry() -> StaticRuleRegistry<ResolvedUser> {
    StaticRuleRegistry::new(&[
        (
            enforce_permission_classifications::RULE_NAME,
            EnforcePermissionClassifications::<ResolvedUser>::factory as RuleFactory<ResolvedUser>,
        ),
        (
            no_inactive_users::RULE_NAME,
            NoInactiveUsers::factory as RuleFactory<ResolvedUser>,
        ),
        (
            no_other_apex_api_logins::RULE_NAME,
            NoOtherApexApiLogins::factory as RuleFactory<ResolvedUser>,
        ),
    ])
}

/// Parse a platform timestamp (`2024-01-15T10:00:00.000+0000` or RFC 3339).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// An active user that passed classification, before permissions are merged.
#[derive(Debug)]
struct Candidate {
    id: String,
    username: String,
    privilege_level: PrivilegeLevel,
    profile: Option<String>,
    permission_sets: Vec<String>,
    last_login: Option<DateTime<Utc>>,
    created_date: Option<DateTime<Utc>>,
}

/// Resolves active users against the user classifications.
#[derive(Debug)]
pub struct UserResolver {
    run_config: Arc<RunConfig>,
}

impl UserResolver {
    /// Create a resolver over the run's user classifications.
    pub fn new(run_config: Arc<RunConfig>) -> Self {
        Self { run_config }
    }

    async fn fetch_records(
        &self,
        ctx: &ResolveContext<'_>,
    ) -> Result<(Vec<Record>, Vec<Record>), ConnectionError> {
        let (users, assignments) = futures::join!(
            ctx.connection.query(USERS_QUERY),
            ctx.connection.query(ASSIGNMENTS_QUERY)
        );
        Ok((users?, assignments?))
    }

    /// Partition active users by classification.
    fn classify(
        &self,
        users: &[Record],
        assignments: &[Record],
        resolution: &mut Resolution<ResolvedUser>,
    ) -> Vec<Candidate> {
        let classified = &self.run_config.classifications.users;

        let mut assigned: HashMap<&str, Vec<String>> = HashMap::new();
        for record in assignments {
            if let (Some(assignee), Some(set)) = (
                record_str(record, "AssigneeId"),
                record_str(record, "PermissionSet.Name"),
            ) {
                assigned.entry(assignee).or_default().push(set.to_owned());
            }
        }

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for record in users {
            let (Some(id), Some(username)) = (record_str(record, "Id"), record_str(record, "Username"))
            else {
                continue;
            };
            seen.insert(username.to_owned());

            let Some(classification) = classified.get(username) else {
                resolution
                    .ignored_entities
                    .push(EntityResolveError::unclassified(username, ENTITY_KIND));
                continue;
            };
            if classification.privilege_level == PrivilegeLevel::Unknown {
                resolution
                    .ignored_entities
                    .push(EntityResolveError::privilege_unknown(username, ENTITY_KIND));
                continue;
            }

            candidates.push(Candidate {
                id: id.to_owned(),
                username: username.to_owned(),
                privilege_level: classification.privilege_level,
                profile: record_str(record, "Profile.Name").map(str::to_owned),
                permission_sets: sorted_unique(assigned.remove(id).unwrap_or_default()),
                last_login: record_str(record, "LastLoginDate").and_then(parse_timestamp),
                created_date: record_str(record, "CreatedDate").and_then(parse_timestamp),
            });
        }

        for username in classified.keys().filter(|name| !seen.contains(*name)) {
            resolution
                .ignored_entities
                .push(EntityResolveError::not_found(username, ENTITY_KIND));
        }
        candidates
    }
}

#[async_trait]
impl EntityResolver<ResolvedUser> for UserResolver {
    async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        progress: &ResolveProgress,
    ) -> Resolution<ResolvedUser> {
        let mut resolution = Resolution::default();

        let (users, assignments) = match self.fetch_records(ctx).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "user records unavailable");
                let message = e.to_string();
                for username in self.run_config.classifications.users.keys() {
                    resolution
                        .ignored_entities
                        .push(EntityResolveError::metadata_unavailable(username, message.clone()));
                }
                return resolution;
            }
        };

        let candidates = self.classify(&users, &assignments, &mut resolution);
        progress.set_total(candidates.len());

        let profile_names: Vec<String> =
            sorted_unique(candidates.iter().filter_map(|c| c.profile.clone()).collect());
        let set_names: Vec<String> = sorted_unique(
            candidates
                .iter()
                .flat_map(|c| c.permission_sets.iter().cloned())
                .collect(),
        );
        debug!(
            users = candidates.len(),
            profiles = profile_names.len(),
            permission_sets = set_names.len(),
            "fetching user permission sources"
        );

        let (profile_docs, set_docs) = futures::join!(
            ctx.cache
                .get_many(ctx.connection, profiles::METADATA_TYPE, &profile_names),
            ctx.cache
                .get_many(ctx.connection, permission_sets::METADATA_TYPE, &set_names)
        );

        for candidate in candidates {
            match merge_permissions(&candidate, &profile_docs, &set_docs) {
                Ok(permissions) => {
                    let user = ResolvedUser {
                        id: candidate.id,
                        username: candidate.username.clone(),
                        privilege_level: candidate.privilege_level,
                        profile: candidate.profile,
                        permission_sets: candidate.permission_sets,
                        permissions,
                        last_login: candidate.last_login,
                        created_date: candidate.created_date,
                    };
                    resolution.resolved_entities.insert(candidate.username, user);
                }
                Err(message) => resolution
                    .ignored_entities
                    .push(EntityResolveError::metadata_unavailable(candidate.username, message)),
            }
            progress.advance(1);
        }

        resolution
    }
}

type Documents = Result<HashMap<String, Arc<serde_json::Value>>, ConnectionError>;

/// Effective permissions of a user, or why they cannot be determined.
fn merge_permissions(
    candidate: &Candidate,
    profile_docs: &Documents,
    set_docs: &Documents,
) -> Result<Vec<String>, String> {
    let mut permissions = Vec::new();

    if let Some(profile) = &candidate.profile {
        let docs = profile_docs.as_ref().map_err(ToString::to_string)?;
        let doc = docs
            .get(profile)
            .ok_or_else(|| format!("metadata of profile {profile} is unavailable"))?;
        permissions.extend(enabled_permissions(doc));
    }

    if !candidate.permission_sets.is_empty() {
        let docs = set_docs.as_ref().map_err(ToString::to_string)?;
        for set in &candidate.permission_sets {
            let doc = docs
                .get(set)
                .ok_or_else(|| format!("metadata of permission set {set} is unavailable"))?;
            permissions.extend(enabled_permissions(doc));
        }
    }

    Ok(sorted_unique(permissions))
}

/// Build the users policy.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] when a rule's options are invalid.
pub fn policy(
    config: PolicyConfig,
    run_config: &Arc<RunConfig>,
) -> Result<Policy<ResolvedUser>, ConfigurationError> {
    Policy::new(
        PolicyKind::Users,
        config,
        run_config,
        &registry(),
        Box::new(UserResolver::new(Arc::clone(run_config))),
    )
}
