//! In-memory [`AuthzStore`] used by tests, benchmarks and the CLI's
//! `--fixture` mode.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::models::{
    Grant, Group, GroupId, GroupMembership, GroupRoleAssignment, OrganizationId,
    OrganizationMembership, RoleId, UserId, UserRoleAssignment,
};
use super::store::{AuthzStore, GrantQuery};
use crate::error::Result;

/// Serializable contents of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub memberships: Vec<OrganizationMembership>,
    pub user_roles: Vec<UserRoleAssignment>,
    pub groups: Vec<Group>,
    pub group_members: Vec<GroupMembership>,
    pub group_roles: Vec<GroupRoleAssignment>,
    pub grants: Vec<Grant>,
}

/// Thread-safe in-memory store.
///
/// Every trait call increments a query counter, see [`InMemoryStore::query_count`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Snapshot>,
    queries: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
            queries: AtomicUsize::new(0),
        }
    }

    /// Load a JSON snapshot from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.data.read().clone()
    }

    /// Number of storage calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Seeding
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the membership for the pair.
    pub fn add_membership(&self, membership: OrganizationMembership) {
        let mut data = self.data.write();
        data.memberships.retain(|m| {
            !(m.user_id == membership.user_id && m.organization_id == membership.organization_id)
        });
        data.memberships.push(membership);
    }

    pub fn assign_role(&self, user_id: UserId, role_id: RoleId) {
        self.data
            .write()
            .user_roles
            .push(UserRoleAssignment { user_id, role_id });
    }

    pub fn add_group(&self, group: Group) {
        self.data.write().groups.push(group);
    }

    pub fn add_group_member(&self, user_id: UserId, group_id: GroupId) {
        self.data
            .write()
            .group_members
            .push(GroupMembership { user_id, group_id });
    }

    pub fn assign_group_role(&self, group_id: GroupId, role_id: RoleId) {
        self.data
            .write()
            .group_roles
            .push(GroupRoleAssignment { group_id, role_id });
    }

    pub fn add_grant(&self, grant: Grant) {
        self.data.write().grants.push(grant);
    }

    fn count(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthzStore for InMemoryStore {
    async fn find_active_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationMembership>> {
        self.count();
        Ok(self
            .data
            .read()
            .memberships
            .iter()
            .find(|m| {
                m.user_id == *user_id && m.organization_id == *organization_id && m.is_active()
            })
            .cloned())
    }

    async fn user_role_assignments(&self, user_id: &UserId) -> Result<Vec<UserRoleAssignment>> {
        self.count();
        Ok(self
            .data
            .read()
            .user_roles
            .iter()
            .filter(|a| a.user_id == *user_id)
            .cloned()
            .collect())
    }

    async fn group_memberships(&self, user_id: &UserId) -> Result<Vec<GroupMembership>> {
        self.count();
        Ok(self
            .data
            .read()
            .group_members
            .iter()
            .filter(|m| m.user_id == *user_id)
            .cloned()
            .collect())
    }

    async fn active_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>> {
        self.count();
        Ok(self
            .data
            .read()
            .groups
            .iter()
            .filter(|g| g.is_active() && group_ids.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn group_role_assignments(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<GroupRoleAssignment>> {
        self.count();
        Ok(self
            .data
            .read()
            .group_roles
            .iter()
            .filter(|a| group_ids.contains(&a.group_id))
            .cloned()
            .collect())
    }

    async fn find_grants(&self, query: &GrantQuery) -> Result<Vec<Grant>> {
        self.count();
        Ok(self
            .data
            .read()
            .grants
            .iter()
            .filter(|g| query.admits(g))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{Effect, GrantSubject, MembershipStatus};
    use crate::rbac::store::{GrantSubjects, ScopeFilter};
    use std::io::Write;

    #[tokio::test]
    async fn test_inactive_membership_not_returned() {
        let store = InMemoryStore::new();
        let user = UserId::generate();
        let org = OrganizationId::generate();
        store.add_membership(OrganizationMembership {
            user_id: user,
            organization_id: org,
            status: MembershipStatus::Suspended,
        });

        assert!(store.find_active_membership(&user, &org).await.unwrap().is_none());

        store.add_membership(OrganizationMembership::active(user, org));
        assert!(store.find_active_membership(&user, &org).await.unwrap().is_some());
        assert_eq!(store.snapshot().memberships.len(), 1);
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn test_find_grants_filters_by_query() {
        let store = InMemoryStore::new();
        let role = RoleId::generate();
        let org = OrganizationId::generate();
        store.add_grant(Grant::global(GrantSubject::Role(role), "posts.read", Effect::Allow));
        store.add_grant(Grant::in_org(GrantSubject::Role(role), org, "posts.write", Effect::Allow));
        store.add_grant(Grant::global(
            GrantSubject::Role(RoleId::generate()),
            "*",
            Effect::Allow,
        ));

        let global = store
            .find_grants(&GrantQuery::new(GrantSubjects::Roles(vec![role]), ScopeFilter::Global))
            .await
            .unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].right, "posts.read");

        let scoped = store
            .find_grants(&GrantQuery::new(
                GrantSubjects::Roles(vec![role]),
                ScopeFilter::Organization(org),
            ))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].right, "posts.write");
    }

    #[test]
    fn test_load_json_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "memberships": [{{
                    "userId": "6f1c3a52-6b0e-4a43-9f62-3f1f7d2f8a10",
                    "organizationId": "0b7e4d7e-58a8-4c1b-8a7c-6b2f5a4f1e21",
                    "status": "active"
                }}],
                "grants": []
            }}"#
        )
        .unwrap();

        let store = InMemoryStore::from_json_file(file.path()).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.memberships.len(), 1);
        assert!(snapshot.groups.is_empty());
    }

    #[test]
    fn test_missing_fixture_is_io_error() {
        let err = InMemoryStore::from_json_file("/nonexistent/fixture.json").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::IoError);
    }
}
