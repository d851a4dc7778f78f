//! The authorization engine: `check_right` and `effective_grants`.
//!
//! Stateless and read-only. Every call resolves membership, aggregates
//! grants and evaluates from scratch; nothing is cached between calls.

use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::field::Empty;
use tracing::{debug, instrument};

use super::aggregate::{aggregate_grants, Layers};
use super::explain::{build_explain, full_trace, ExplainEntry};
use super::matcher::{RightMatcher, WildcardMatcher};
use super::membership::{resolve_membership, Membership};
use super::models::{Grant, GroupId, OrganizationId, OrganizationMembership, RoleId, UserId};
use super::normalize::{normalize_id, normalize_right};
use super::policy::{evaluate, Decision, DecisionLayer, DecisionReason};
use super::store::AuthzStore;
use crate::error::{AuthzError, Result};

/// Roles and groups that applied to an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthzContext {
    pub roles: Vec<RoleId>,
    pub groups: Vec<GroupId>,
}

impl From<&Membership> for AuthzContext {
    fn from(m: &Membership) -> Self {
        Self {
            roles: m.effective_role_ids.clone(),
            groups: m.visible_group_ids(),
        }
    }
}

/// Outcome of [`AuthorizationEngine::check_right`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RightCheck {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub decision_layer: Option<DecisionLayer>,
    pub explain: Vec<ExplainEntry>,
    pub context: Option<AuthzContext>,
}

impl RightCheck {
    fn without_context(decision: Decision) -> Self {
        Self {
            allowed: decision.allowed,
            reason: decision.reason,
            decision_layer: decision.decision_layer,
            explain: Vec::new(),
            context: None,
        }
    }
}

/// Outcome of [`AuthorizationEngine::effective_grants`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveGrants {
    pub grants: Vec<Grant>,
    pub layers: Layers,
    pub explain: Vec<ExplainEntry>,
    pub context: Option<AuthzContext>,
    pub org_member: Option<OrganizationMembership>,
}

/// Evaluates rights for users in organizations against an [`AuthzStore`].
pub struct AuthorizationEngine<S: ?Sized, M = WildcardMatcher> {
    store: Arc<S>,
    matcher: M,
}

impl<S: ?Sized, M: Clone> Clone for AuthorizationEngine<S, M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            matcher: self.matcher.clone(),
        }
    }
}

impl<S> AuthorizationEngine<S, WildcardMatcher>
where
    S: AuthzStore + ?Sized,
{
    /// Engine with the default wildcard matcher.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_matcher(store, WildcardMatcher::new())
    }
}

impl<S, M> AuthorizationEngine<S, M>
where
    S: AuthzStore + ?Sized,
    M: RightMatcher,
{
    pub fn with_matcher(store: Arc<S>, matcher: M) -> Self {
        Self { store, matcher }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Normalize the raw pair and resolve membership. `None` for malformed
    /// ids or missing/inactive membership.
    async fn membership(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<Option<(UserId, OrganizationId, Membership)>> {
        let (Some(user), Some(org)) = (
            normalize_id::<UserId>(user_id),
            normalize_id::<OrganizationId>(organization_id),
        ) else {
            debug!("Malformed user or organization id");
            return Ok(None);
        };

        Ok(resolve_membership(self.store.as_ref(), &user, &org)
            .await?
            .map(|m| (user, org, m)))
    }

    /// Decide whether `user_id` holds `right` in `organization_id`.
    ///
    /// Negative outcomes are `Ok` values; `Err` means the store failed and
    /// no decision could be made.
    #[instrument(skip(self), fields(reason = Empty, layer = Empty))]
    pub async fn check_right(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
        right: Option<&str>,
    ) -> Result<RightCheck> {
        let check = self.check_right_inner(user_id, organization_id, right).await;
        match &check {
            Ok(c) => {
                let span = tracing::Span::current();
                span.record("reason", c.reason.as_str());
                if let Some(layer) = c.decision_layer {
                    span.record("layer", layer.as_str());
                }
                counter!("authz_decisions_total", "reason" => c.reason.as_str()).increment(1);
            }
            Err(e) => e.log(),
        }
        check
    }

    async fn check_right_inner(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
        right: Option<&str>,
    ) -> Result<RightCheck> {
        let right = normalize_right(right);
        if right.is_empty() {
            return Ok(RightCheck::without_context(Decision::invalid_right()));
        }

        let Some((user, org, membership)) = self.membership(user_id, organization_id).await? else {
            return Ok(RightCheck::without_context(Decision::not_org_member()));
        };

        let layers = aggregate_grants(self.store.as_ref(), &user, &org, &membership).await?;
        let decision = evaluate(&layers, &right, &self.matcher);
        let explain = build_explain(&layers, &decision);

        Ok(RightCheck {
            allowed: decision.allowed,
            reason: decision.reason,
            decision_layer: decision.decision_layer,
            explain,
            context: Some(AuthzContext::from(&membership)),
        })
    }

    /// Everything the user can reach in the organization, without a specific
    /// right in mind. Non-members get an empty result.
    #[instrument(skip(self))]
    pub async fn effective_grants(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<EffectiveGrants> {
        let grants = self.effective_grants_inner(user_id, organization_id).await;
        if let Err(e) = &grants {
            e.log();
        }
        grants
    }

    async fn effective_grants_inner(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<EffectiveGrants> {
        let Some((user, org, membership)) = self.membership(user_id, organization_id).await? else {
            return Ok(EffectiveGrants::default());
        };

        let layers = aggregate_grants(self.store.as_ref(), &user, &org, &membership).await?;

        Ok(EffectiveGrants {
            grants: layers.all_grants(),
            explain: full_trace(&layers),
            context: Some(AuthzContext::from(&membership)),
            org_member: Some(membership.org_member),
            layers,
        })
    }

    /// `Ok(())` if allowed, a uniform `Forbidden` error otherwise.
    pub async fn enforce(
        &self,
        user_id: Option<&str>,
        organization_id: Option<&str>,
        right: Option<&str>,
    ) -> Result<()> {
        let check = self.check_right(user_id, organization_id, right).await?;
        if check.allowed {
            Ok(())
        } else {
            Err(AuthzError::forbidden())
        }
    }
}
