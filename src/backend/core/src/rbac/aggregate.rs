//! Grant aggregation into the four priority layers.
//!
//! Up to eight lookups are issued (four subject kinds × two scopes),
//! concurrently, and merged by subject kind. Lookups whose subject set is
//! empty are skipped.

use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

use super::membership::Membership;
use super::models::{Grant, OrganizationId, ScopeType, SubjectType, UserId};
use super::store::{AuthzStore, GrantQuery, GrantSubjects, ScopeFilter};
use crate::error::Result;

/// A grant layer. Each layer holds the grants of one subject kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Org,
    Group,
    Role,
    User,
}

impl Layer {
    /// Allow-resolution order. Broadest layer first.
    pub const PRIORITY: [Layer; 4] = [Layer::Org, Layer::Group, Layer::Role, Layer::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Group => "group",
            Self::Role => "role",
            Self::User => "user",
        }
    }

    pub fn for_subject(subject_type: SubjectType) -> Self {
        match subject_type {
            SubjectType::Org => Self::Org,
            SubjectType::Group => Self::Group,
            SubjectType::Role => Self::Role,
            SubjectType::User => Self::User,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grants partitioned by layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Layers {
    pub org: Vec<Grant>,
    pub group: Vec<Grant>,
    pub role: Vec<Grant>,
    pub user: Vec<Grant>,
}

impl Layers {
    pub fn get(&self, layer: Layer) -> &[Grant] {
        match layer {
            Layer::Org => &self.org,
            Layer::Group => &self.group,
            Layer::Role => &self.role,
            Layer::User => &self.user,
        }
    }

    fn get_mut(&mut self, layer: Layer) -> &mut Vec<Grant> {
        match layer {
            Layer::Org => &mut self.org,
            Layer::Group => &mut self.group,
            Layer::Role => &mut self.role,
            Layer::User => &mut self.user,
        }
    }

    /// Place a grant in the layer of its subject.
    pub fn push(&mut self, grant: Grant) {
        let layer = Layer::for_subject(grant.subject.subject_type());
        self.get_mut(layer).push(grant);
    }

    /// Every grant with its layer, in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (Layer, &Grant)> + '_ {
        Layer::PRIORITY
            .into_iter()
            .flat_map(move |layer| self.get(layer).iter().map(move |g| (layer, g)))
    }

    pub fn len(&self) -> usize {
        self.org.len() + self.group.len() + self.role.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into a single list, in priority order.
    pub fn all_grants(&self) -> Vec<Grant> {
        self.iter().map(|(_, g)| g.clone()).collect()
    }
}

/// The lookups needed for a resolved membership, empty subject sets omitted.
pub fn plan_queries(
    user_id: &UserId,
    organization_id: &OrganizationId,
    membership: &Membership,
) -> Vec<GrantQuery> {
    let subjects = [
        GrantSubjects::Organization(*organization_id),
        GrantSubjects::Groups(membership.visible_group_ids()),
        GrantSubjects::Roles(membership.effective_role_ids.clone()),
        GrantSubjects::User(*user_id),
    ];

    subjects
        .into_iter()
        .filter(|s| !s.is_empty())
        .flat_map(|s| {
            [
                GrantQuery::new(s.clone(), ScopeFilter::Global),
                GrantQuery::new(s, ScopeFilter::Organization(*organization_id)),
            ]
        })
        .collect()
}

/// Fetch and layer every grant applicable to the membership.
pub async fn aggregate_grants<S>(
    store: &S,
    user_id: &UserId,
    organization_id: &OrganizationId,
    membership: &Membership,
) -> Result<Layers>
where
    S: AuthzStore + ?Sized,
{
    let queries = plan_queries(user_id, organization_id, membership);
    let results = try_join_all(queries.iter().map(|q| store.find_grants(q))).await?;

    let mut layers = Layers::default();
    let mut seen = HashSet::new();

    for (query, grants) in queries.iter().zip(results) {
        let expected = query.subjects.subject_type();
        for grant in grants {
            if grant.subject.subject_type() != expected || !seen.insert(grant.id) {
                continue;
            }
            if grant.scope_type == ScopeType::Org && grant.scope_id.is_none() {
                warn!(grant_id = %grant.id, "Org-scoped grant without scope id");
                continue;
            }
            layers.push(grant);
        }
    }

    debug!(
        user_id = %user_id,
        organization_id = %organization_id,
        queries = queries.len(),
        org = layers.org.len(),
        group = layers.group.len(),
        role = layers.role.len(),
        user = layers.user.len(),
        "Aggregated grants"
    );

    Ok(layers)
}
