//! Tests for `src/audit/progress.rs`.

use tokio::sync::mpsc;

use orgaudit::audit::{AuditEvent, ResolveProgress};
use orgaudit::config::PolicyKind;

fn drain(rx: &mut mpsc::UnboundedReceiver<AuditEvent>) -> Vec<(usize, usize)> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AuditEvent::ResolveProgress { total, resolved, .. } = event {
            seen.push((total, resolved));
        }
    }
    seen
}

#[test]
fn resolved_is_monotone_and_capped() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = ResolveProgress::new(PolicyKind::Profiles, Some(&tx));

    progress.set_total(3);
    progress.advance(1);
    progress.advance(5);
    progress.advance(1);
    progress.finish();

    let seen = drain(&mut rx);
    assert_eq!(seen.first(), Some(&(3, 0)));
    assert_eq!(seen.last(), Some(&(3, 3)));
    for pair in seen.windows(2) {
        assert!(pair[0].1 <= pair[1].1, "resolved must not decrease: {seen:?}");
    }
    assert!(seen.iter().all(|(total, resolved)| resolved <= total));
}

#[test]
fn finish_completes_partial_progress() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = ResolveProgress::new(PolicyKind::Users, Some(&tx));
    progress.set_total(4);
    progress.advance(1);
    progress.finish();

    assert_eq!(progress.snapshot(), (4, 4));
    assert_eq!(drain(&mut rx).last(), Some(&(4, 4)));
}

#[test]
fn without_listener_progress_still_counts() {
    let progress = ResolveProgress::new(PolicyKind::Settings, None);
    progress.set_total(2);
    progress.advance(1);
    assert_eq!(progress.snapshot(), (2, 1));
}

#[test]
fn dropped_receiver_is_not_an_error() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let progress = ResolveProgress::new(PolicyKind::Profiles, Some(&tx));
    progress.set_total(1);
    progress.finish();
    assert_eq!(progress.snapshot(), (1, 1));
}
