//! Progress notifications for the presentation layer.
//!
//! Events travel over an optional unbounded channel handed to the run. A
//! dropped receiver is not an error; events are simply discarded.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::PolicyKind;

/// Stages of an audit run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditStage {
    /// Policies resolve their entities.
    Resolving,
    /// Policies execute their rules.
    Executing,
    /// Accepted risks are applied and results assembled.
    Finalising,
    /// The audit result is ready.
    Completed,
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Resolving => "resolving",
            Self::Executing => "executing",
            Self::Finalising => "finalising",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// A progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AuditEvent {
    /// The run entered a new stage.
    StageChanged {
        /// The stage entered.
        stage: AuditStage,
    },
    /// A policy made progress resolving its entities.
    ResolveProgress {
        /// Policy reporting progress.
        policy: PolicyKind,
        /// Entities to resolve.
        total: usize,
        /// Entities resolved so far, never decreasing.
        resolved: usize,
    },
}

/// Optional event channel.
pub type EventSink = Option<UnboundedSender<AuditEvent>>;

/// Send an event if anyone is listening.
pub(crate) fn emit(sink: Option<&UnboundedSender<AuditEvent>>, event: AuditEvent) {
    if let Some(tx) = sink {
        // Receiver dropped: the presentation layer stopped listening.
        let _ = tx.send(event);
    }
}

/// Per-policy resolve counter.
///
/// `resolved` only grows and is capped at `total`; [`ResolveProgress::finish`]
/// always emits a final event with `resolved == total`.
#[derive(Debug)]
pub struct ResolveProgress {
    policy: PolicyKind,
    sink: EventSink,
    total: AtomicUsize,
    resolved: AtomicUsize,
}

impl ResolveProgress {
    /// Create a counter reporting to `sink`.
    pub fn new(policy: PolicyKind, sink: Option<&UnboundedSender<AuditEvent>>) -> Self {
        Self {
            policy,
            sink: sink.cloned(),
            total: AtomicUsize::new(0),
            resolved: AtomicUsize::new(0),
        }
    }

    /// Set the number of entities to resolve.
    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.emit();
    }

    /// Record `count` more resolved entities.
    pub fn advance(&self, count: usize) {
        let total = self.total.load(Ordering::SeqCst);
        // Infallible: the closure always returns Some.
        let _ = self
            .resolved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(count).min(total).max(current))
            });
        self.emit();
    }

    /// Mark resolution complete.
    pub fn finish(&self) {
        let total = self.total.load(Ordering::SeqCst);
        self.resolved.fetch_max(total, Ordering::SeqCst);
        self.emit();
    }

    /// Current `(total, resolved)`.
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.total.load(Ordering::SeqCst),
            self.resolved.load(Ordering::SeqCst),
        )
    }

    fn emit(&self) {
        let (total, resolved) = self.snapshot();
        emit(
            self.sink.as_ref(),
            AuditEvent::ResolveProgress {
                policy: self.policy,
                total,
                resolved,
            },
        );
    }
}
