//! Role-Based Access Control (RBAC) decision engine for multi-tenant orgs.
//!
//! This module provides:
//! - **Models**: memberships, groups, role links and layered grants
//! - **Membership resolution**: the active-membership gate plus visible groups and roles
//! - **Aggregation**: grants fetched per subject kind and scope, merged into layers
//! - **Policy**: deny-overrides evaluation with org → group → role → user allow priority
//! - **Explain**: the grants that decided an outcome, for diagnostics
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_core::rbac::{AuthorizationEngine, InMemoryStore};
//!
//! let engine = AuthorizationEngine::new(Arc::new(InMemoryStore::new()));
//! let check = engine
//!     .check_right(Some(&user_id), Some(&org_id), Some("posts.write"))
//!     .await?;
//!
//! if !check.allowed {
//!     // map to a uniform "forbidden"; keep `reason`/`explain` internal
//! }
//! ```

pub mod aggregate;
pub mod engine;
pub mod explain;
pub mod matcher;
pub mod membership;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod policy;
pub mod store;

pub use aggregate::{aggregate_grants, Layer, Layers};
pub use engine::{AuthorizationEngine, AuthzContext, EffectiveGrants, RightCheck};
pub use explain::{build_explain, ExplainEntry};
pub use matcher::{RightMatcher, WildcardMatcher};
pub use membership::{resolve_membership, Membership};
pub use memory::{InMemoryStore, Snapshot};
pub use models::{
    Effect, Grant, GrantId, GrantSubject, Group, GroupId, GroupMembership, GroupRoleAssignment,
    GroupStatus, MembershipStatus, OrganizationId, OrganizationMembership, RoleId, ScopeType,
    SubjectType, UserId, UserRoleAssignment,
};
pub use normalize::{normalize_id, normalize_right};
pub use policy::{evaluate, Decision, DecisionLayer, DecisionReason};
pub use store::{AuthzStore, GrantQuery, GrantSubjects, ScopeFilter};
