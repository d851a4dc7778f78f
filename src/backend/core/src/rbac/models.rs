//! RBAC data models: identifiers, memberships, groups, role links and grants.
//!
//! These are the read-side shapes the decision engine consumes. They are
//! created and mutated by the administration surface, never by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Strongly-typed user identifier.
    UserId
);
define_id!(
    /// Strongly-typed organization identifier.
    OrganizationId
);
define_id!(
    /// Strongly-typed role identifier.
    RoleId
);
define_id!(
    /// Strongly-typed group identifier.
    GroupId
);
define_id!(
    /// Strongly-typed grant identifier.
    GrantId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Organization Membership
// ═══════════════════════════════════════════════════════════════════════════════

/// Membership status. Memberships are soft-deleted through status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Invited,
    Suspended,
    Removed,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invited => "invited",
            Self::Suspended => "suspended",
            Self::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "invited" => Some(Self::Invited),
            "suspended" => Some(Self::Suspended),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

/// Membership record linking a user to an organization.
///
/// At most one record exists per `(user_id, organization_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMembership {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub status: MembershipStatus,
}

impl OrganizationMembership {
    pub fn active(user_id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            organization_id,
            status: MembershipStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Groups and role links
// ═══════════════════════════════════════════════════════════════════════════════

/// Group status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Active,
    Archived,
}

impl GroupStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// A group of users.
///
/// A global group is visible in every organization and its
/// `organization_id` is ignored. A non-global group is visible only inside
/// the organization it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub is_global: bool,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    pub status: GroupStatus,
}

impl Group {
    pub fn global(id: GroupId) -> Self {
        Self {
            id,
            is_global: true,
            organization_id: None,
            status: GroupStatus::Active,
        }
    }

    pub fn scoped(id: GroupId, organization_id: OrganizationId) -> Self {
        Self {
            id,
            is_global: false,
            organization_id: Some(organization_id),
            status: GroupStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GroupStatus::Active
    }

    /// Whether members see this group while acting in `organization_id`.
    pub fn is_visible_in(&self, organization_id: &OrganizationId) -> bool {
        self.is_global || self.organization_id.as_ref() == Some(organization_id)
    }
}

/// Direct role assignment to a user. Organization scoping happens on grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleAssignment {
    pub user_id: UserId,
    pub role_id: RoleId,
}

/// A user's membership in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    pub user_id: UserId,
    pub group_id: GroupId,
}

/// A group conferring a role on all of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRoleAssignment {
    pub group_id: GroupId,
    pub role_id: RoleId,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Grants
// ═══════════════════════════════════════════════════════════════════════════════

/// The four kinds of grant subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Org,
    Group,
    Role,
    User,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Group => "group",
            Self::Role => "role",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "org" => Some(Self::Org),
            "group" => Some(Self::Group),
            "role" => Some(Self::Role),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a grant is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum GrantSubject {
    Org(OrganizationId),
    Group(GroupId),
    Role(RoleId),
    User(UserId),
}

impl GrantSubject {
    pub fn subject_type(&self) -> SubjectType {
        match self {
            Self::Org(_) => SubjectType::Org,
            Self::Group(_) => SubjectType::Group,
            Self::Role(_) => SubjectType::Role,
            Self::User(_) => SubjectType::User,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Org(id) => id.0,
            Self::Group(id) => id.0,
            Self::Role(id) => id.0,
            Self::User(id) => id.0,
        }
    }

    /// Rebuild a subject from its stored `(type, id)` pair.
    pub fn from_parts(subject_type: SubjectType, id: Uuid) -> Self {
        match subject_type {
            SubjectType::Org => Self::Org(OrganizationId(id)),
            SubjectType::Group => Self::Group(GroupId(id)),
            SubjectType::Role => Self::Role(RoleId(id)),
            SubjectType::User => Self::User(UserId(id)),
        }
    }
}

/// Whether a grant applies everywhere or within one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Global,
    Org,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Org => "org",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Self::Global),
            "org" => Some(Self::Org),
            _ => None,
        }
    }
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

/// The atomic policy unit.
///
/// `scope_id` is required when `scope_type` is [`ScopeType::Org`]. A record
/// missing it is kept as-is and simply never matches an org-scoped lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: GrantId,
    pub subject: GrantSubject,
    pub scope_type: ScopeType,
    #[serde(default)]
    pub scope_id: Option<OrganizationId>,
    /// Right pattern, opaque to everything but the matcher.
    pub right: String,
    pub effect: Effect,
}

impl Grant {
    /// A grant that applies in every organization.
    pub fn global(subject: GrantSubject, right: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: GrantId::generate(),
            subject,
            scope_type: ScopeType::Global,
            scope_id: None,
            right: right.into(),
            effect,
        }
    }

    /// A grant that applies only within `organization_id`.
    pub fn in_org(
        subject: GrantSubject,
        organization_id: OrganizationId,
        right: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            id: GrantId::generate(),
            subject,
            scope_type: ScopeType::Org,
            scope_id: Some(organization_id),
            right: right.into(),
            effect,
        }
    }

    pub fn is_deny(&self) -> bool {
        self.effect == Effect::Deny
    }

    /// Origin tag used in explain traces, e.g. `"role:org"`.
    pub fn origin(&self) -> String {
        format!("{}:{}", self.subject.subject_type().as_str(), self.scope_type.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
