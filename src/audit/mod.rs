//! Audit run orchestration.
//!
//! A run moves through four stages in strict sequence. Within the
//! resolving and executing stages every policy proceeds concurrently, and
//! each stage is awaited to completion before the next begins; a slow
//! policy delays the stage, never an unrelated policy.
//!
//! ```text
//! resolving ──► executing ──► finalising ──► completed
//! ```
//!
//! Only configuration problems are fatal, and they surface from
//! [`AuditRun::new`]. Remote failures have already been absorbed into
//! ignored entities, rule warnings and rule errors by the time results
//! reach the orchestrator.

pub mod progress;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, info_span, Instrument};

use crate::accepted_risk::AcceptedRiskMatcher;
use crate::config::{ConfigurationError, PolicyKind, RunConfig};
use crate::connection::{Connection, MetadataCache};
use crate::policies::{build_policies, AuditPolicy, ResolveContext};
use crate::result::{AuditResult, PolicyResult};

pub use progress::{AuditEvent, AuditStage, EventSink, ResolveProgress};

/// A configured audit, ready to execute against a connection.
pub struct AuditRun {
    run_config: Arc<RunConfig>,
    policies: Vec<Box<dyn AuditPolicy>>,
}

impl std::fmt::Debug for AuditRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<PolicyKind> = self.policies.iter().map(|p| p.kind()).collect();
        f.debug_struct("AuditRun").field("policies", &kinds).finish()
    }
}

impl AuditRun {
    /// Validate the configuration and instantiate all policies.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the accepted-risk tree is
    /// malformed, no policy is enabled, or a rule's options are invalid.
    pub fn new(run_config: RunConfig) -> Result<Self, ConfigurationError> {
        run_config.accepted_risks.validate()?;
        if run_config.enabled_policy_count() == 0 {
            return Err(ConfigurationError::NoExecutablePolicies);
        }

        let run_config = Arc::new(run_config);
        let policies = build_policies(&run_config)?;
        Ok(Self {
            run_config,
            policies,
        })
    }

    /// Configuration this run was built from.
    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    /// Execute the audit.
    ///
    /// Progress events are sent to `events` when given.
    pub async fn execute(
        &self,
        connection: &dyn Connection,
        events: Option<&UnboundedSender<AuditEvent>>,
    ) -> AuditResult {
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("audit", %run_id, subject = connection.subject_id());
        self.execute_inner(connection, events).instrument(span).await
    }

    async fn execute_inner(
        &self,
        connection: &dyn Connection,
        events: Option<&UnboundedSender<AuditEvent>>,
    ) -> AuditResult {
        let cache = MetadataCache::new();
        let ctx = ResolveContext {
            connection,
            cache: &cache,
            events,
        };

        enter_stage(events, AuditStage::Resolving);
        let summaries = join_all(self.policies.iter().map(|p| p.resolve_entities(&ctx))).await;
        let resolved: usize = summaries.iter().map(|s| s.resolved).sum();
        let ignored: usize = summaries.iter().map(|s| s.ignored).sum();
        info!(resolved, ignored, cached = cache.cached_count(), "entities resolved");

        enter_stage(events, AuditStage::Executing);
        let raw_results = join_all(self.policies.iter().map(|p| p.execute(&ctx))).await;

        enter_stage(events, AuditStage::Finalising);
        let policies = self.finalise(self.policies.iter().map(|p| p.kind()).zip(raw_results));
        let result = AuditResult::new(connection.subject_id(), policies);

        enter_stage(events, AuditStage::Completed);
        info!(compliant = result.is_compliant, "audit completed");
        result
    }

    /// Apply accepted risks and recompute compliance.
    fn finalise(
        &self,
        raw_results: impl Iterator<Item = (PolicyKind, PolicyResult)>,
    ) -> BTreeMap<PolicyKind, PolicyResult> {
        let matcher = AcceptedRiskMatcher::new(&self.run_config.accepted_risks);
        raw_results
            .map(|(kind, mut policy_result)| {
                for rule_result in policy_result.executed_rules.values_mut() {
                    let mut scrubbed = matcher.scrub(kind, rule_result);
                    scrubbed.is_compliant = scrubbed.violations.is_empty();
                    *rule_result = scrubbed;
                }
                policy_result.refresh_compliance();
                (kind, policy_result)
            })
            .collect()
    }
}

fn enter_stage(events: Option<&UnboundedSender<AuditEvent>>, stage: AuditStage) {
    info!(%stage, "audit stage");
    progress::emit(events, AuditEvent::StageChanged { stage });
}
