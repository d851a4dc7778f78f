//! Read-only storage seam for the decision engine.
//!
//! The engine receives an [`AuthzStore`] explicitly; there is no ambient
//! registry. Implementations: [`PgAuthzStore`](crate::db::PgAuthzStore)
//! and [`InMemoryStore`](super::memory::InMemoryStore).

use async_trait::async_trait;

use super::models::{
    Grant, GrantSubject, Group, GroupId, GroupMembership, GroupRoleAssignment, OrganizationId,
    OrganizationMembership, RoleId, SubjectType, UserId, UserRoleAssignment,
};
use crate::error::Result;

/// The subjects whose grants a single lookup targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantSubjects {
    Organization(OrganizationId),
    Groups(Vec<GroupId>),
    Roles(Vec<RoleId>),
    User(UserId),
}

impl GrantSubjects {
    pub fn subject_type(&self) -> SubjectType {
        match self {
            Self::Organization(_) => SubjectType::Org,
            Self::Groups(_) => SubjectType::Group,
            Self::Roles(_) => SubjectType::Role,
            Self::User(_) => SubjectType::User,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Organization(_) | Self::User(_) => false,
            Self::Groups(ids) => ids.is_empty(),
            Self::Roles(ids) => ids.is_empty(),
        }
    }

    /// Raw subject ids, in the shape stored on grant records.
    pub fn ids(&self) -> Vec<uuid::Uuid> {
        match self {
            Self::Organization(id) => vec![id.0],
            Self::User(id) => vec![id.0],
            Self::Groups(ids) => ids.iter().map(|id| id.0).collect(),
            Self::Roles(ids) => ids.iter().map(|id| id.0).collect(),
        }
    }

    pub fn contains(&self, subject: &GrantSubject) -> bool {
        match (self, subject) {
            (Self::Organization(a), GrantSubject::Org(b)) => a == b,
            (Self::User(a), GrantSubject::User(b)) => a == b,
            (Self::Groups(ids), GrantSubject::Group(id)) => ids.contains(id),
            (Self::Roles(ids), GrantSubject::Role(id)) => ids.contains(id),
            _ => false,
        }
    }
}

/// Which scope a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Global,
    Organization(OrganizationId),
}

/// One grant lookup: a subject selection at a single scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantQuery {
    pub subjects: GrantSubjects,
    pub scope: ScopeFilter,
}

impl GrantQuery {
    pub fn new(subjects: GrantSubjects, scope: ScopeFilter) -> Self {
        Self { subjects, scope }
    }

    /// Whether `grant` satisfies this query. Org-scoped grants with no
    /// `scope_id` never satisfy an organization filter.
    pub fn admits(&self, grant: &Grant) -> bool {
        use super::models::ScopeType;

        if !self.subjects.contains(&grant.subject) {
            return false;
        }
        match self.scope {
            ScopeFilter::Global => grant.scope_type == ScopeType::Global,
            ScopeFilter::Organization(org) => {
                grant.scope_type == ScopeType::Org && grant.scope_id == Some(org)
            }
        }
    }
}

/// Read access to memberships, groups, role links and grants.
#[async_trait]
pub trait AuthzStore: Send + Sync {
    /// The active membership for the pair, if any.
    async fn find_active_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationMembership>>;

    async fn user_role_assignments(&self, user_id: &UserId) -> Result<Vec<UserRoleAssignment>>;

    async fn group_memberships(&self, user_id: &UserId) -> Result<Vec<GroupMembership>>;

    /// Active groups among `group_ids`.
    async fn active_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>>;

    async fn group_role_assignments(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<GroupRoleAssignment>>;

    async fn find_grants(&self, query: &GrantQuery) -> Result<Vec<Grant>>;
}
