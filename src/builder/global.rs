//! Global alias resolution over a finished graph.
//!
//! Incremental resolution only catches names that look alike. Role names and
//! nicknames ("남편", "인력거꾼" for "김첨지") share no characters with the
//! proper name, so a second pass hands batches of same-typed entities, with
//! their relationship context, to a [`MergeAdvisor`] and applies the merge
//! groups it is confident about.

use serde::{Deserialize, Serialize};

use crate::collaborator::MergeAdvisor;
use crate::graph::{Entity, KnowledgeGraph};

/// Relationship signals shown per entity.
const MAX_NEIGHBOR_SIGNALS: usize = 12;

/// A proposed merge: every duplicate folds into the canonical entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub canonical_entity_id: String,
    #[serde(default)]
    pub duplicate_entity_ids: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

/// One relationship of a candidate entity, described from its side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborSignal {
    pub relation_type: String,
    pub other_name: String,
    pub other_type: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub relation_description: String,
}

/// An entity presented to the advisor together with its neighborhood.
#[derive(Debug, Clone, Serialize)]
pub struct MergeCandidate<'a> {
    pub entity: &'a Entity,
    pub neighbors: Vec<NeighborSignal>,
}

/// What a resolution pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalResolution {
    /// `(canonical, duplicate)` pairs, in application order.
    pub merges: Vec<(String, String)>,
    /// Batches whose advisor call failed.
    pub failed_batches: usize,
}

/// Advisor-driven merge pass.
#[derive(Debug, Clone)]
pub struct GlobalResolver {
    /// Groups below this confidence are ignored.
    pub min_confidence: f64,
    /// Upper bound on entities per advisor call.
    pub max_entities_per_pass: usize,
    /// Only entities of this type are considered; `None` considers all.
    pub entity_type: Option<String>,
}

impl Default for GlobalResolver {
    fn default() -> Self {
        Self {
            min_confidence: 0.75,
            max_entities_per_pass: 80,
            entity_type: Some("PERSON".into()),
        }
    }
}

impl GlobalResolver {
    /// Run one pass over `graph`, merging in place.
    pub fn resolve(&self, graph: &mut KnowledgeGraph, advisor: &dyn MergeAdvisor) -> GlobalResolution {
        let mut outcome = GlobalResolution::default();
        let ids: Vec<String> = graph
            .entities()
            .iter()
            .filter(|e| self.accepts(e))
            .map(|e| e.id.clone())
            .collect();
        if ids.len() < 2 {
            return outcome;
        }

        for batch in ids.chunks(self.max_entities_per_pass.max(1)) {
            let groups = {
                let candidates: Vec<MergeCandidate<'_>> = batch
                    .iter()
                    .filter_map(|id| graph.entity(id))
                    .map(|entity| MergeCandidate {
                        entity,
                        neighbors: neighbor_signals(graph, &entity.id),
                    })
                    .collect();
                if candidates.len() < 2 {
                    continue;
                }
                match advisor.propose_merges(&candidates) {
                    Ok(groups) => groups,
                    Err(err) => {
                        tracing::warn!(%err, batch = candidates.len(), "merge advisor failed, batch skipped");
                        outcome.failed_batches += 1;
                        continue;
                    }
                }
            };
            for group in groups {
                self.apply_group(graph, &group, &mut outcome);
            }
        }

        tracing::info!(
            merges = outcome.merges.len(),
            failed_batches = outcome.failed_batches,
            "global resolution finished"
        );
        outcome
    }

    fn accepts(&self, entity: &Entity) -> bool {
        match &self.entity_type {
            Some(wanted) => entity.entity_type.as_deref() == Some(wanted.as_str()),
            None => true,
        }
    }

    fn apply_group(&self, graph: &mut KnowledgeGraph, group: &MergeGroup, outcome: &mut GlobalResolution) {
        if !(group.confidence >= self.min_confidence) {
            tracing::debug!(
                canonical = %group.canonical_entity_id,
                confidence = group.confidence,
                "merge group below confidence threshold"
            );
            return;
        }
        let canonical = &group.canonical_entity_id;
        if !graph.entity(canonical).is_some_and(|e| self.accepts(e)) {
            return;
        }
        for duplicate in &group.duplicate_entity_ids {
            if duplicate == canonical || !graph.entity(duplicate).is_some_and(|e| self.accepts(e)) {
                continue;
            }
            if graph.merge_entities(canonical, duplicate) {
                tracing::info!(
                    canonical = %canonical,
                    duplicate = %duplicate,
                    reason = %group.reason,
                    "entities merged"
                );
                outcome.merges.push((canonical.clone(), duplicate.clone()));
            }
        }
    }
}

fn neighbor_signals(graph: &KnowledgeGraph, entity_id: &str) -> Vec<NeighborSignal> {
    graph
        .relationships_for(entity_id)
        .into_iter()
        .filter_map(|rel| {
            let other = graph.entity(rel.other_end(entity_id))?;
            Some(NeighborSignal {
                relation_type: rel.relation_type.clone(),
                other_name: other.canonical_name.clone(),
                other_type: other.entity_type.clone(),
                relation_description: rel.description.clone(),
            })
        })
        .take(MAX_NEIGHBOR_SIGNALS)
        .collect()
}
