//! Database layer for Tessera.
//!
//! PostgreSQL-backed [`AuthzStore`] using sqlx. Each collection the engine
//! reads is one table; grants of every subject kind share the `grants`
//! table and are converted into the typed [`Grant`] on read.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{AuthzError, ErrorCode, Result};
use crate::rbac::models::{
    Effect, Grant, GrantId, GrantSubject, Group, GroupId, GroupMembership, GroupRoleAssignment,
    GroupStatus, MembershipStatus, OrganizationId, OrganizationMembership, RoleId, ScopeType,
    SubjectType, UserId, UserRoleAssignment,
};
use crate::rbac::store::{AuthzStore, GrantQuery, ScopeFilter};

/// PostgreSQL authorization store.
#[derive(Clone)]
pub struct PgAuthzStore {
    pool: PgPool,
}

impl PgAuthzStore {
    /// Create a new connection pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        tracing::info!(max_connections = config.max_connections, "Connected to database");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AuthzStore for PgAuthzStore {
    async fn find_active_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationMembership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT user_id, organization_id, status
            FROM organization_memberships
            WHERE user_id = $1 AND organization_id = $2 AND status = 'active'
            "#,
        )
        .bind(user_id.0)
        .bind(organization_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrganizationMembership::try_from).transpose()
    }

    async fn user_role_assignments(&self, user_id: &UserId) -> Result<Vec<UserRoleAssignment>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT user_id, role_id
            FROM user_roles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, role_id)| UserRoleAssignment {
                user_id: UserId(user_id),
                role_id: RoleId(role_id),
            })
            .collect())
    }

    async fn group_memberships(&self, user_id: &UserId) -> Result<Vec<GroupMembership>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT user_id, group_id
            FROM group_members
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, group_id)| GroupMembership {
                user_id: UserId(user_id),
                group_id: GroupId(group_id),
            })
            .collect())
    }

    async fn active_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>> {
        let ids: Vec<Uuid> = group_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, is_global, organization_id, status
            FROM groups
            WHERE id = ANY($1) AND status = 'active'
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Group::try_from).collect()
    }

    async fn group_role_assignments(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<GroupRoleAssignment>> {
        let ids: Vec<Uuid> = group_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT group_id, role_id
            FROM group_roles
            WHERE group_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(group_id, role_id)| GroupRoleAssignment {
                group_id: GroupId(group_id),
                role_id: RoleId(role_id),
            })
            .collect())
    }

    async fn find_grants(&self, query: &GrantQuery) -> Result<Vec<Grant>> {
        let subject_type = query.subjects.subject_type().as_str();
        let subject_ids = query.subjects.ids();

        let rows = match query.scope {
            ScopeFilter::Global => {
                sqlx::query_as::<_, GrantRow>(
                    r#"
                    SELECT id, subject_type, subject_id, scope_type, scope_id, right_pattern, effect
                    FROM grants
                    WHERE subject_type = $1
                      AND subject_id = ANY($2)
                      AND scope_type = 'global'
                    ORDER BY created_at, id
                    "#,
                )
                .bind(subject_type)
                .bind(subject_ids)
                .fetch_all(&self.pool)
                .await?
            }
            ScopeFilter::Organization(org) => {
                sqlx::query_as::<_, GrantRow>(
                    r#"
                    SELECT id, subject_type, subject_id, scope_type, scope_id, right_pattern, effect
                    FROM grants
                    WHERE subject_type = $1
                      AND subject_id = ANY($2)
                      AND scope_type = 'org'
                      AND scope_id = $3
                    ORDER BY created_at, id
                    "#,
                )
                .bind(subject_type)
                .bind(subject_ids)
                .bind(org.0)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Grant::try_from).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub struct MembershipRow {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub status: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct GroupRow {
    pub id: Uuid,
    pub is_global: bool,
    pub organization_id: Option<Uuid>,
    pub status: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct GrantRow {
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub scope_type: String,
    pub scope_id: Option<Uuid>,
    pub right_pattern: String,
    pub effect: String,
}

fn invalid_record(table: &str, column: &str, value: &str) -> AuthzError {
    AuthzError::with_internal(
        ErrorCode::InvalidRecord,
        "A stored authorization record could not be decoded",
        format!("{}.{} has unknown value {:?}", table, column, value),
    )
}

impl TryFrom<MembershipRow> for OrganizationMembership {
    type Error = AuthzError;

    fn try_from(row: MembershipRow) -> Result<Self> {
        let status = MembershipStatus::parse(&row.status)
            .ok_or_else(|| invalid_record("organization_memberships", "status", &row.status))?;
        Ok(Self {
            user_id: UserId(row.user_id),
            organization_id: OrganizationId(row.organization_id),
            status,
        })
    }
}

impl TryFrom<GroupRow> for Group {
    type Error = AuthzError;

    fn try_from(row: GroupRow) -> Result<Self> {
        let status = GroupStatus::parse(&row.status)
            .ok_or_else(|| invalid_record("groups", "status", &row.status))?;
        Ok(Self {
            id: GroupId(row.id),
            is_global: row.is_global,
            organization_id: row.organization_id.map(OrganizationId),
            status,
        })
    }
}

impl TryFrom<GrantRow> for Grant {
    type Error = AuthzError;

    fn try_from(row: GrantRow) -> Result<Self> {
        let subject_type = SubjectType::parse(&row.subject_type)
            .ok_or_else(|| invalid_record("grants", "subject_type", &row.subject_type))?;
        let scope_type = ScopeType::parse(&row.scope_type)
            .ok_or_else(|| invalid_record("grants", "scope_type", &row.scope_type))?;
        let effect = Effect::parse(&row.effect)
            .ok_or_else(|| invalid_record("grants", "effect", &row.effect))?;

        Ok(Self {
            id: GrantId(row.id),
            subject: GrantSubject::from_parts(subject_type, row.subject_id),
            scope_type,
            scope_id: row.scope_id.map(OrganizationId),
            right: row.right_pattern,
            effect,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
