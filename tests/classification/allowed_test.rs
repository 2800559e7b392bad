//! Permission-vs-privilege comparator tests.

use orgaudit::classification::{PermissionClassification, PrivilegeLevel, RiskLevel};
use orgaudit::allowed;

#[test]
fn blocked_is_never_allowed() {
    for privilege in PrivilegeLevel::ALL {
        assert!(
            !allowed(RiskLevel::Blocked, privilege),
            "BLOCKED must be denied for {privilege}"
        );
    }
}

#[test]
fn admin_may_hold_critical() {
    assert!(allowed(RiskLevel::Critical, PrivilegeLevel::Admin));
    assert!(!allowed(RiskLevel::Critical, PrivilegeLevel::Developer));
}

#[test]
fn developer_may_hold_high() {
    assert!(allowed(RiskLevel::High, PrivilegeLevel::Developer));
    assert!(!allowed(RiskLevel::High, PrivilegeLevel::PowerUser));
}

#[test]
fn power_user_may_hold_medium() {
    assert!(allowed(RiskLevel::Medium, PrivilegeLevel::PowerUser));
    assert!(!allowed(RiskLevel::Medium, PrivilegeLevel::StandardUser));
}

#[test]
fn standard_user_may_hold_low() {
    assert!(allowed(RiskLevel::Low, PrivilegeLevel::StandardUser));
    assert!(!allowed(RiskLevel::Low, PrivilegeLevel::Unknown));
}

#[test]
fn unknown_risk_is_allowed_everywhere() {
    for privilege in PrivilegeLevel::ALL {
        assert!(allowed(RiskLevel::Unknown, privilege));
    }
}

#[test]
fn allowed_is_monotone_in_privilege() {
    // Walking towards more privilege never revokes a grant.
    for risk in RiskLevel::ALL {
        let grants: Vec<bool> = PrivilegeLevel::ALL
            .iter()
            .rev()
            .map(|privilege| allowed(risk, *privilege))
            .collect();
        let first_allowed = grants.iter().position(|g| *g).unwrap_or(grants.len());
        assert!(
            grants[first_allowed..].iter().all(|g| *g),
            "grants for {risk} are not monotone: {grants:?}"
        );
    }
}

#[test]
fn levels_deserialize_from_screaming_snake_case() {
    let classification: PermissionClassification =
        serde_json::from_str(r#"{"riskLevel":"CRITICAL","reason":"modifies all data"}"#)
            .expect("should parse classification");
    assert_eq!(classification.risk_level, RiskLevel::Critical);
    assert_eq!(classification.reason.as_deref(), Some("modifies all data"));

    let privilege: PrivilegeLevel =
        serde_json::from_str(r#""POWER_USER""#).expect("should parse privilege");
    assert_eq!(privilege, PrivilegeLevel::PowerUser);
}

#[test]
fn display_matches_wire_names() {
    assert_eq!(RiskLevel::Blocked.to_string(), "BLOCKED");
    assert_eq!(PrivilegeLevel::StandardUser.to_string(), "STANDARD_USER");
}
