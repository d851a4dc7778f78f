//! Membership resolution: the single authorization gate.
//!
//! For a `(user, organization)` pair this establishes active membership and
//! then resolves the groups visible in that organization and every role the
//! user reaches, directly or through those groups.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use super::models::{
    Group, GroupId, GroupRoleAssignment, OrganizationId, OrganizationMembership, RoleId, UserId,
};
use super::store::AuthzStore;
use crate::error::Result;

/// Resolved membership of a user in one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub org_member: OrganizationMembership,
    /// Active groups that are global or scoped to this organization.
    pub visible_groups: Vec<Group>,
    pub direct_role_ids: Vec<RoleId>,
    /// Role links of the visible groups only.
    pub group_role_links: Vec<GroupRoleAssignment>,
    /// Direct and group-inherited roles, deduplicated and sorted.
    pub effective_role_ids: Vec<RoleId>,
}

impl Membership {
    pub fn visible_group_ids(&self) -> Vec<GroupId> {
        self.visible_groups.iter().map(|g| g.id).collect()
    }
}

/// Resolve membership for an already-normalized pair.
///
/// Returns `Ok(None)` when there is no active membership; in that case no
/// further storage reads are issued.
pub async fn resolve_membership<S>(
    store: &S,
    user_id: &UserId,
    organization_id: &OrganizationId,
) -> Result<Option<Membership>>
where
    S: AuthzStore + ?Sized,
{
    let Some(org_member) = store.find_active_membership(user_id, organization_id).await? else {
        debug!(user_id = %user_id, organization_id = %organization_id, "No active membership");
        return Ok(None);
    };

    let (direct, group_links) = futures::try_join!(
        store.user_role_assignments(user_id),
        store.group_memberships(user_id),
    )?;

    let direct_role_ids: BTreeSet<RoleId> = direct.into_iter().map(|a| a.role_id).collect();
    let all_group_ids: Vec<GroupId> = group_links
        .into_iter()
        .map(|m| m.group_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut visible_groups = if all_group_ids.is_empty() {
        Vec::new()
    } else {
        store.active_groups(&all_group_ids).await?
    };
    visible_groups.retain(|g| g.is_active() && g.is_visible_in(organization_id));
    visible_groups.sort_by_key(|g| g.id);
    visible_groups.dedup_by_key(|g| g.id);

    let visible_ids: Vec<GroupId> = visible_groups.iter().map(|g| g.id).collect();
    let group_role_links = if visible_ids.is_empty() {
        Vec::new()
    } else {
        let mut links = store.group_role_assignments(&visible_ids).await?;
        links.retain(|l| visible_ids.contains(&l.group_id));
        links
    };

    let effective_role_ids: Vec<RoleId> = direct_role_ids
        .iter()
        .copied()
        .chain(group_role_links.iter().map(|l| l.role_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    debug!(
        user_id = %user_id,
        organization_id = %organization_id,
        groups = visible_groups.len(),
        roles = effective_role_ids.len(),
        "Resolved membership"
    );

    Ok(Some(Membership {
        org_member,
        visible_groups,
        direct_role_ids: direct_role_ids.into_iter().collect(),
        group_role_links,
        effective_role_ids,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::memory::InMemoryStore;
    use crate::rbac::models::GroupStatus;

    struct Fixture {
        store: InMemoryStore,
        user: UserId,
        org: OrganizationId,
    }

    fn member() -> Fixture {
        let store = InMemoryStore::new();
        let user = UserId::generate();
        let org = OrganizationId::generate();
        store.add_membership(OrganizationMembership::active(user, org));
        Fixture { store, user, org }
    }

    #[tokio::test]
    async fn test_non_member_short_circuits() {
        let store = InMemoryStore::new();
        let user = UserId::generate();
        store.assign_role(user, RoleId::generate());

        let resolved = resolve_membership(&store, &user, &OrganizationId::generate())
            .await
            .unwrap();
        assert!(resolved.is_none());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_direct_and_group_roles_merge() {
        let f = member();
        let shared = RoleId::generate();
        let inherited = RoleId::generate();
        let group = GroupId::generate();

        f.store.assign_role(f.user, shared);
        f.store.add_group(Group::global(group));
        f.store.add_group_member(f.user, group);
        f.store.assign_group_role(group, shared);
        f.store.assign_group_role(group, inherited);

        let m = resolve_membership(&f.store, &f.user, &f.org).await.unwrap().unwrap();
        assert_eq!(m.direct_role_ids, vec![shared]);
        assert_eq!(m.group_role_links.len(), 2);
        assert_eq!(m.effective_role_ids.len(), 2);
        assert!(m.effective_role_ids.contains(&inherited));
        assert!(m.effective_role_ids.contains(&shared));
    }

    #[tokio::test]
    async fn test_groups_of_other_orgs_are_hidden() {
        let f = member();
        let here = GroupId::generate();
        let elsewhere = GroupId::generate();
        let archived = GroupId::generate();

        f.store.add_group(Group::scoped(here, f.org));
        f.store.add_group(Group::scoped(elsewhere, OrganizationId::generate()));
        f.store.add_group(Group {
            status: GroupStatus::Archived,
            ..Group::global(archived)
        });
        for g in [here, elsewhere, archived] {
            f.store.add_group_member(f.user, g);
            f.store.assign_group_role(g, RoleId::generate());
        }

        let m = resolve_membership(&f.store, &f.user, &f.org).await.unwrap().unwrap();
        assert_eq!(m.visible_group_ids(), vec![here]);
        assert_eq!(m.group_role_links.len(), 1);
        assert_eq!(m.effective_role_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_member_without_groups_skips_group_queries() {
        let f = member();
        let m = resolve_membership(&f.store, &f.user, &f.org).await.unwrap().unwrap();
        assert!(m.visible_groups.is_empty());
        assert!(m.effective_role_ids.is_empty());
        // membership + direct roles + group memberships
        assert_eq!(f.store.query_count(), 3);
    }
}
