#![allow(clippy::result_large_err)]
//! # Tessera Core
//!
//! Authorization decisions for multi-tenant organizations.
//!
//! ## Architecture
//!
//! - **RBAC**: membership resolution, layered grant aggregation and
//!   deny-overrides evaluation with an explain trace
//! - **DB**: PostgreSQL-backed store for memberships, groups, roles and grants
//! - **Config**: file and environment configuration
//! - **Telemetry**: structured logging

pub mod config;
pub mod db;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use error::{AuthzError, ErrorCode, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::db::PgAuthzStore;
    pub use crate::error::{AuthzError, ErrorCode, Result};
    pub use crate::rbac::{
        AuthorizationEngine, AuthzStore, DecisionReason, EffectiveGrants, InMemoryStore,
        RightCheck, WildcardMatcher,
    };
}
