//! Explain traces: which grants decided an outcome.

use serde::Serialize;
use uuid::Uuid;

use super::aggregate::Layers;
use super::models::{Effect, GrantId, OrganizationId, ScopeType, SubjectType};
use super::policy::Decision;

/// One grant in an explain trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainEntry {
    /// `<subject type>:<scope type>`, e.g. `"group:global"`.
    pub origin: String,
    pub effect: Effect,
    pub right: String,
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    pub scope_type: ScopeType,
    pub scope_id: Option<OrganizationId>,
    pub grant_id: GrantId,
}

/// Trace every aggregated grant, in layer priority order.
pub fn full_trace(layers: &Layers) -> Vec<ExplainEntry> {
    layers
        .iter()
        .map(|(_, grant)| ExplainEntry {
            origin: grant.origin(),
            effect: grant.effect,
            right: grant.right.clone(),
            subject_type: grant.subject.subject_type(),
            subject_id: grant.subject.id(),
            scope_type: grant.scope_type,
            scope_id: grant.scope_id,
            grant_id: grant.id,
        })
        .collect()
}

/// Trace only the grants that took part in the decision's winning phase.
pub fn build_explain(layers: &Layers, decision: &Decision) -> Vec<ExplainEntry> {
    let matched = decision.matched_grant_ids();
    if matched.is_empty() {
        return Vec::new();
    }

    let mut trace = full_trace(layers);
    trace.retain(|entry| matched.contains(&entry.grant_id));
    trace
}
