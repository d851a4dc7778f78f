//! Policy evaluation over aggregated layers.
//!
//! The policy answers: "given these layered grants, is `right` allowed?"
//!
//! 1. Any matching deny, in any layer, denies.
//! 2. Otherwise the first layer in [`Layer::PRIORITY`] holding a matching
//!    allow is reported as the decisive layer.
//! 3. Otherwise nothing matched.

use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

use super::aggregate::{Layer, Layers};
use super::matcher::RightMatcher;
use super::models::{Effect, Grant, GrantId};

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a decision came out the way it did. The string forms are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    InvalidRight,
    NotOrgMember,
    Denied,
    Allowed,
    NoMatch,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRight => "invalid_right",
            Self::NotOrgMember => "not_org_member",
            Self::Denied => "denied",
            Self::Allowed => "allowed",
            Self::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The layer cited for a decision: the deny phase, or an allow layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionLayer {
    Deny,
    Allow(Layer),
}

impl DecisionLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::Allow(layer) => layer.as_str(),
        }
    }
}

impl fmt::Display for DecisionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DecisionLayer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub decision_layer: Option<DecisionLayer>,
    /// Grants that took part in the winning phase.
    #[serde(skip)]
    matched: Vec<GrantId>,
}

impl Decision {
    fn negative(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
            decision_layer: None,
            matched: Vec::new(),
        }
    }

    pub fn invalid_right() -> Self {
        Self::negative(DecisionReason::InvalidRight)
    }

    pub fn not_org_member() -> Self {
        Self::negative(DecisionReason::NotOrgMember)
    }

    pub fn no_match() -> Self {
        Self::negative(DecisionReason::NoMatch)
    }

    fn denied(matched: Vec<GrantId>) -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::Denied,
            decision_layer: Some(DecisionLayer::Deny),
            matched,
        }
    }

    fn allowed(layer: Layer, matched: Vec<GrantId>) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Allowed,
            decision_layer: Some(DecisionLayer::Allow(layer)),
            matched,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Ids of the grants that decided this outcome.
    pub fn matched_grant_ids(&self) -> &[GrantId] {
        &self.matched
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

fn matching<'a, M: RightMatcher + ?Sized>(
    grants: impl Iterator<Item = &'a Grant>,
    effect: Effect,
    required: &'a str,
    matcher: &'a M,
) -> impl Iterator<Item = &'a Grant> {
    grants.filter(move |g| g.effect == effect && matcher.matches(required, &g.right))
}

/// Evaluate `required_right` against the layers.
///
/// `required_right` must already be normalized; an empty right yields
/// `invalid_right`. Membership is the caller's concern.
pub fn evaluate<M>(layers: &Layers, required_right: &str, matcher: &M) -> Decision
where
    M: RightMatcher + ?Sized,
{
    if required_right.is_empty() {
        return Decision::invalid_right();
    }

    let denies: Vec<GrantId> = matching(
        layers.iter().map(|(_, g)| g),
        Effect::Deny,
        required_right,
        matcher,
    )
    .map(|g| g.id)
    .collect();

    if !denies.is_empty() {
        debug!(right = required_right, denies = denies.len(), "Denied by explicit deny");
        return Decision::denied(denies);
    }

    for layer in Layer::PRIORITY {
        let allows: Vec<GrantId> =
            matching(layers.get(layer).iter(), Effect::Allow, required_right, matcher)
                .map(|g| g.id)
                .collect();
        if !allows.is_empty() {
            debug!(right = required_right, layer = %layer, "Allowed");
            return Decision::allowed(layer, allows);
        }
    }

    debug!(right = required_right, "No matching grant");
    Decision::no_match()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
