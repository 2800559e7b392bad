//! Orgaudit: access-control audit engine for multi-tenant SaaS platforms.
//!
//! An audit run resolves a platform's profiles, permission sets, users,
//! connected apps and settings groups against operator classifications,
//! runs configurable rules over them, mutes pre-approved findings and
//! reports compliance per policy and overall.
//!
//! The remote platform is reached only through the [`connection::Connection`]
//! trait. Configuration problems abort a run in [`audit::AuditRun::new`];
//! everything that goes wrong remotely ends up in the result instead.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classification;
pub mod config;
pub mod connection;
pub mod entities;
pub mod logging;
pub mod result;

pub mod accepted_risk;
pub mod policies;
pub mod rules;

pub mod audit;

pub use audit::AuditRun;
pub use classification::{allowed, PrivilegeLevel, RiskLevel};
pub use config::{ConfigurationError, PolicyKind, RunConfig};
pub use result::AuditResult;
