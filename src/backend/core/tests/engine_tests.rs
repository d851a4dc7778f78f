//! Engine behaviour over the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::error::{AuthzError, ErrorCode, Result};
use tessera_core::rbac::{
    AuthorizationEngine, AuthzStore, DecisionLayer, DecisionReason, Effect, Grant, GrantQuery,
    GrantSubject, Group, GroupId, GroupMembership, GroupRoleAssignment, InMemoryStore, Layer,
    MembershipStatus, OrganizationId, OrganizationMembership, RoleId, UserId, UserRoleAssignment,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

struct Fixture {
    store: Arc<InMemoryStore>,
    engine: AuthorizationEngine<InMemoryStore>,
    user: UserId,
    org: OrganizationId,
}

impl Fixture {
    /// An active member of a fresh organization, with no roles, groups or grants.
    fn member() -> Self {
        let fixture = Self::outsider();
        fixture
            .store
            .add_membership(OrganizationMembership::active(fixture.user, fixture.org));
        fixture
    }

    /// A user with no membership in the organization.
    fn outsider() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            engine: AuthorizationEngine::new(Arc::clone(&store)),
            store,
            user: UserId::generate(),
            org: OrganizationId::generate(),
        }
    }

    fn user_id(&self) -> String {
        self.user.to_string()
    }

    fn org_id(&self) -> String {
        self.org.to_string()
    }

    async fn check(&self, right: &str) -> tessera_core::rbac::RightCheck {
        self.engine
            .check_right(Some(&self.user_id()), Some(&self.org_id()), Some(right))
            .await
            .unwrap()
    }

    fn role(&self) -> RoleId {
        let role = RoleId::generate();
        self.store.assign_role(self.user, role);
        role
    }

    fn group(&self, group: Group) -> GroupId {
        let id = group.id;
        self.store.add_group(group);
        self.store.add_group_member(self.user, id);
        id
    }
}

/// Fails every grant lookup, after answering membership questions normally.
struct BrokenGrantStore {
    inner: InMemoryStore,
}

#[async_trait]
impl AuthzStore for BrokenGrantStore {
    async fn find_active_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationMembership>> {
        self.inner.find_active_membership(user_id, organization_id).await
    }

    async fn user_role_assignments(&self, user_id: &UserId) -> Result<Vec<UserRoleAssignment>> {
        self.inner.user_role_assignments(user_id).await
    }

    async fn group_memberships(&self, user_id: &UserId) -> Result<Vec<GroupMembership>> {
        self.inner.group_memberships(user_id).await
    }

    async fn active_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>> {
        self.inner.active_groups(group_ids).await
    }

    async fn group_role_assignments(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<GroupRoleAssignment>> {
        self.inner.group_role_assignments(group_ids).await
    }

    async fn find_grants(&self, _query: &GrantQuery) -> Result<Vec<Grant>> {
        Err(AuthzError::new(
            ErrorCode::DatabaseQueryFailed,
            "grant lookup failed",
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Membership Gate
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_non_member_is_gated_regardless_of_grants() {
    let f = Fixture::outsider();
    f.store.add_grant(Grant::global(GrantSubject::User(f.user), "*", Effect::Allow));
    f.store
        .add_grant(Grant::in_org(GrantSubject::Org(f.org), f.org, "posts.write", Effect::Allow));

    let check = f.check("posts.write").await;
    assert!(!check.allowed);
    assert_eq!(check.reason, DecisionReason::NotOrgMember);
    assert_eq!(check.decision_layer, None);
    assert!(check.explain.is_empty());
    assert!(check.context.is_none());
    // only the membership lookup ran
    assert_eq!(f.store.query_count(), 1);
}

#[tokio::test]
async fn test_inactive_membership_is_not_a_member() {
    for status in [
        MembershipStatus::Invited,
        MembershipStatus::Suspended,
        MembershipStatus::Removed,
    ] {
        let f = Fixture::outsider();
        f.store.add_membership(OrganizationMembership {
            user_id: f.user,
            organization_id: f.org,
            status,
        });
        f.store.add_grant(Grant::global(GrantSubject::User(f.user), "*", Effect::Allow));

        let check = f.check("posts.read").await;
        assert_eq!(check.reason, DecisionReason::NotOrgMember, "{:?}", status);
    }
}

#[tokio::test]
async fn test_malformed_ids_are_not_members() {
    let f = Fixture::member();
    let org = f.org_id();

    for user in ["", "   ", "not-a-uuid", "00000000-0000-0000-0000-000000000000"] {
        let check = f
            .engine
            .check_right(Some(user), Some(&org), Some("posts.read"))
            .await
            .unwrap();
        assert_eq!(check.reason, DecisionReason::NotOrgMember, "{:?}", user);
    }

    let check = f
        .engine
        .check_right(None, Some(&org), Some("posts.read"))
        .await
        .unwrap();
    assert_eq!(check.reason, DecisionReason::NotOrgMember);
}

#[tokio::test]
async fn test_ids_are_trimmed_and_case_insensitive() {
    let f = Fixture::member();
    f.store.add_grant(Grant::global(GrantSubject::User(f.user), "posts.read", Effect::Allow));

    let user = format!("  {}  ", f.user_id().to_uppercase());
    let check = f
        .engine
        .check_right(Some(&user), Some(&f.org_id()), Some("posts.read"))
        .await
        .unwrap();
    assert!(check.allowed);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Right Validation
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_empty_right_issues_no_queries() {
    let f = Fixture::member();
    f.store.add_grant(Grant::global(GrantSubject::User(f.user), "*", Effect::Allow));

    for right in [Some(""), Some("   "), None] {
        let check = f
            .engine
            .check_right(Some(&f.user_id()), Some(&f.org_id()), right)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.reason, DecisionReason::InvalidRight);
        assert!(check.context.is_none());
    }

    assert_eq!(f.store.query_count(), 0);
}

#[tokio::test]
async fn test_empty_right_wins_over_bad_ids() {
    let f = Fixture::outsider();
    let check = f
        .engine
        .check_right(Some("garbage"), None, Some(""))
        .await
        .unwrap();
    assert_eq!(check.reason, DecisionReason::InvalidRight);
    assert_eq!(f.store.query_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_member_without_grants_is_no_match() {
    let f = Fixture::member();
    f.role();

    let check = f.check("posts.read").await;
    assert!(!check.allowed);
    assert_eq!(check.reason, DecisionReason::NoMatch);
    assert_eq!(check.decision_layer, None);
    assert!(check.explain.is_empty());
    assert!(check.context.is_some());
}

#[tokio::test]
async fn test_deny_overrides_allow_in_any_layer() {
    let f = Fixture::member();
    let org_allow =
        Grant::in_org(GrantSubject::Org(f.org), f.org, "posts.*", Effect::Allow);
    let user_deny = Grant::global(GrantSubject::User(f.user), "posts.write", Effect::Deny);
    let deny_id = user_deny.id;
    f.store.add_grant(org_allow);
    f.store.add_grant(user_deny);

    let check = f.check("posts.write").await;
    assert!(!check.allowed);
    assert_eq!(check.reason, DecisionReason::Denied);
    assert_eq!(check.decision_layer, Some(DecisionLayer::Deny));
    assert_eq!(check.explain.len(), 1);
    assert_eq!(check.explain[0].grant_id, deny_id);
    assert_eq!(check.explain[0].origin, "user:global");

    // the deny is scoped to one right
    let check = f.check("posts.read").await;
    assert!(check.allowed);
    assert_eq!(check.decision_layer, Some(DecisionLayer::Allow(Layer::Org)));
}

#[tokio::test]
async fn test_org_layer_reported_before_user_layer() {
    let f = Fixture::member();
    f.store
        .add_grant(Grant::global(GrantSubject::User(f.user), "reports.view", Effect::Allow));
    f.store.add_grant(Grant::in_org(
        GrantSubject::Org(f.org),
        f.org,
        "reports.view",
        Effect::Allow,
    ));

    let check = f.check("reports.view").await;
    assert!(check.allowed);
    assert_eq!(check.reason, DecisionReason::Allowed);
    assert_eq!(check.decision_layer, Some(DecisionLayer::Allow(Layer::Org)));
    assert_eq!(check.explain.len(), 1);
    assert_eq!(check.explain[0].origin, "org:org");
}

#[tokio::test]
async fn test_editor_role_scenario() {
    let f = Fixture::member();
    let editor = f.role();
    f.store
        .add_grant(Grant::global(GrantSubject::Role(editor), "posts.write", Effect::Allow));

    let check = f.check("posts.write").await;
    assert!(check.allowed);
    assert_eq!(check.reason, DecisionReason::Allowed);
    assert_eq!(check.decision_layer, Some(DecisionLayer::Allow(Layer::Role)));
    assert_eq!(check.context.unwrap().roles, vec![editor]);

    // an org-scoped deny flips it
    f.store.add_grant(Grant::in_org(
        GrantSubject::Org(f.org),
        f.org,
        "posts.*",
        Effect::Deny,
    ));

    let check = f.check("posts.write").await;
    assert!(!check.allowed);
    assert_eq!(check.reason, DecisionReason::Denied);
    assert_eq!(check.decision_layer, Some(DecisionLayer::Deny));
}

#[tokio::test]
async fn test_grants_scoped_to_other_org_are_ignored() {
    let f = Fixture::member();
    let other = OrganizationId::generate();
    f.store.add_grant(Grant::in_org(
        GrantSubject::User(f.user),
        other,
        "posts.write",
        Effect::Allow,
    ));

    assert_eq!(f.check("posts.write").await.reason, DecisionReason::NoMatch);
}

#[tokio::test]
async fn test_org_scoped_grant_without_scope_never_matches() {
    let f = Fixture::member();
    let mut broken = Grant::in_org(GrantSubject::User(f.user), f.org, "*", Effect::Allow);
    broken.scope_id = None;
    f.store.add_grant(broken);

    assert_eq!(f.check("posts.write").await.reason, DecisionReason::NoMatch);
}

#[tokio::test]
async fn test_explain_omits_non_matching_grants() {
    let f = Fixture::member();
    let role = f.role();
    f.store
        .add_grant(Grant::global(GrantSubject::Role(role), "billing.view", Effect::Allow));
    f.store
        .add_grant(Grant::global(GrantSubject::Role(role), "billing.*", Effect::Deny));
    f.store
        .add_grant(Grant::global(GrantSubject::Role(role), "posts.read", Effect::Allow));
    f.store
        .add_grant(Grant::global(GrantSubject::User(f.user), "posts.*", Effect::Allow));

    let check = f.check("posts.read").await;
    assert_eq!(check.decision_layer, Some(DecisionLayer::Allow(Layer::Role)));
    assert_eq!(check.explain.len(), 1);
    assert_eq!(check.explain[0].right, "posts.read");
    assert_eq!(check.explain[0].effect, Effect::Allow);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Groups
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_group_scoped_to_other_org_contributes_nothing() {
    let f = Fixture::member();
    let elsewhere = f.group(Group::scoped(GroupId::generate(), OrganizationId::generate()));
    let role = RoleId::generate();
    f.store.assign_group_role(elsewhere, role);
    f.store
        .add_grant(Grant::global(GrantSubject::Group(elsewhere), "*", Effect::Allow));
    f.store
        .add_grant(Grant::global(GrantSubject::Role(role), "*", Effect::Allow));

    let check = f.check("posts.write").await;
    assert_eq!(check.reason, DecisionReason::NoMatch);
    let context = check.context.unwrap();
    assert!(context.groups.is_empty());
    assert!(context.roles.is_empty());
}

#[tokio::test]
async fn test_global_and_same_org_groups_are_visible() {
    let f = Fixture::member();
    let global = f.group(Group::global(GroupId::generate()));
    let local = f.group(Group::scoped(GroupId::generate(), f.org));
    f.store.add_grant(Grant::global(
        GrantSubject::Group(local),
        "members.invite",
        Effect::Allow,
    ));

    let check = f.check("members.invite").await;
    assert!(check.allowed);
    assert_eq!(check.decision_layer, Some(DecisionLayer::Allow(Layer::Group)));

    let mut groups = check.context.unwrap().groups;
    groups.sort();
    let mut expected = vec![global, local];
    expected.sort();
    assert_eq!(groups, expected);
}

#[tokio::test]
async fn test_archived_group_is_ignored() {
    let f = Fixture::member();
    let mut group = Group::global(GroupId::generate());
    group.status = tessera_core::rbac::GroupStatus::Archived;
    let id = f.group(group);
    f.store.add_grant(Grant::global(GrantSubject::Group(id), "*", Effect::Allow));

    assert_eq!(f.check("posts.read").await.reason, DecisionReason::NoMatch);
}

#[tokio::test]
async fn test_role_through_group_matches_direct_assignment() {
    let via_group = Fixture::member();
    let group = via_group.group(Group::scoped(GroupId::generate(), via_group.org));
    let role = RoleId::generate();
    via_group.store.assign_group_role(group, role);
    via_group
        .store
        .add_grant(Grant::global(GrantSubject::Role(role), "posts.write", Effect::Allow));

    let direct = Fixture::member();
    let direct_role = direct.role();
    direct.store.add_grant(Grant::global(
        GrantSubject::Role(direct_role),
        "posts.write",
        Effect::Allow,
    ));

    let a = via_group.check("posts.write").await;
    let b = direct.check("posts.write").await;
    assert_eq!(a.allowed, b.allowed);
    assert_eq!(a.reason, b.reason);
    assert_eq!(a.decision_layer, b.decision_layer);
    assert_eq!(a.context.unwrap().roles, vec![role]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query Planning
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_empty_subject_sets_are_not_queried() {
    let f = Fixture::member();
    f.check("posts.read").await;

    // membership, direct roles, group links, then org and user grants in
    // both scopes; group and role lookups are skipped
    assert_eq!(f.store.query_count(), 7);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Effective Grants
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_effective_grants_lists_every_layer() {
    let f = Fixture::member();
    let role = f.role();
    let group = f.group(Group::global(GroupId::generate()));
    f.store
        .add_grant(Grant::in_org(GrantSubject::Org(f.org), f.org, "org.view", Effect::Allow));
    f.store
        .add_grant(Grant::global(GrantSubject::Group(group), "wiki.*", Effect::Allow));
    f.store
        .add_grant(Grant::global(GrantSubject::Role(role), "posts.*", Effect::Allow));
    f.store
        .add_grant(Grant::in_org(GrantSubject::User(f.user), f.org, "posts.delete", Effect::Deny));

    let grants = f
        .engine
        .effective_grants(Some(&f.user_id()), Some(&f.org_id()))
        .await
        .unwrap();

    assert_eq!(grants.grants.len(), 4);
    assert_eq!(grants.explain.len(), 4);
    for layer in Layer::PRIORITY {
        assert_eq!(grants.layers.get(layer).len(), 1, "{}", layer);
    }
    let origins: Vec<&str> = grants.explain.iter().map(|e| e.origin.as_str()).collect();
    assert_eq!(origins, vec!["org:org", "group:global", "role:global", "user:org"]);
    assert_eq!(
        grants.org_member.map(|m| m.status),
        Some(MembershipStatus::Active)
    );
}

#[tokio::test]
async fn test_effective_grants_for_non_member_is_empty() {
    let f = Fixture::outsider();
    f.store.add_grant(Grant::global(GrantSubject::User(f.user), "*", Effect::Allow));

    let grants = f
        .engine
        .effective_grants(Some(&f.user_id()), Some(&f.org_id()))
        .await
        .unwrap();

    assert!(grants.grants.is_empty());
    assert!(grants.layers.is_empty());
    assert!(grants.org_member.is_none());
    assert!(grants.context.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enforcement and Failures
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_enforce_maps_every_refusal_to_forbidden() {
    let f = Fixture::member();
    f.store
        .add_grant(Grant::global(GrantSubject::User(f.user), "posts.read", Effect::Allow));
    let user = f.user_id();
    let org = f.org_id();

    assert!(f
        .engine
        .enforce(Some(&user), Some(&org), Some("posts.read"))
        .await
        .is_ok());

    for right in [Some("posts.write"), Some(""), None] {
        let err = f.engine.enforce(Some(&user), Some(&org), right).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    let stranger = UserId::generate().to_string();
    let err = f
        .engine
        .enforce(Some(&stranger), Some(&org), Some("posts.read"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn test_store_failure_is_an_error_not_a_decision() {
    let inner = InMemoryStore::new();
    let user = UserId::generate();
    let org = OrganizationId::generate();
    inner.add_membership(OrganizationMembership::active(user, org));

    let engine = AuthorizationEngine::new(Arc::new(BrokenGrantStore { inner }));
    let err = engine
        .check_right(
            Some(&user.to_string()),
            Some(&org.to_string()),
            Some("posts.read"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DatabaseQueryFailed);

    let err = engine
        .effective_grants(Some(&user.to_string()), Some(&org.to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DatabaseQueryFailed);

    // the membership gate still answers without touching grants
    let check = engine
        .check_right(
            Some(&UserId::generate().to_string()),
            Some(&org.to_string()),
            Some("posts.read"),
        )
        .await
        .unwrap();
    assert_eq!(check.reason, DecisionReason::NotOrgMember);
}

#[tokio::test]
async fn test_engine_over_trait_object() {
    let f = Fixture::member();
    f.store
        .add_grant(Grant::global(GrantSubject::User(f.user), "posts.*", Effect::Allow));

    let store: Arc<dyn AuthzStore> = f.store.clone();
    let engine = AuthorizationEngine::new(store);
    let check = engine
        .check_right(Some(&f.user_id()), Some(&f.org_id()), Some("posts.edit"))
        .await
        .unwrap();
    assert!(check.allowed);
    assert_eq!(check.decision_layer, Some(DecisionLayer::Allow(Layer::User)));
}
