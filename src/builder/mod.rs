//! Graph builder: folds per-fragment extraction output into one graph.
//!
//! Fragment results may arrive in any order; they are buffered and applied
//! strictly in ascending fragment index, one fragment at a time, so the final
//! graph does not depend on completion timing. Within a fragment, entities are
//! merged before relationships so relationship endpoints can resolve against
//! names introduced by the same fragment.
//!
//! Problems with individual candidates or fragments never abort a run; they
//! are collected as [`IngestWarning`]s and returned in the [`IngestSummary`].
//!
//! Fragment indexes are local to one builder session. Provenance ids are
//! offset past every fragment already recorded in the starting graph, so an
//! appended session never reuses an earlier session's fragment ids.

pub mod global;
pub mod pipeline;
pub mod reorder;

use crate::config::ResolutionConfig;
use crate::error::IngestWarning;
use crate::extraction::{EntityCandidate, FragmentExtraction, RelationshipCandidate};
use crate::graph::{Entity, KnowledgeGraph, Relationship, fragment_id};

pub use global::{GlobalResolution, GlobalResolver, MergeCandidate, MergeGroup, NeighborSignal};
pub use pipeline::ExtractionPipeline;
pub use reorder::ReorderBuffer;

/// A buffered fragment outcome awaiting its turn.
#[derive(Debug)]
enum Slot {
    Extracted(FragmentExtraction),
    Skipped(IngestWarning),
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    pub fragments_applied: usize,
    pub fragments_skipped: usize,
    /// Warnings in fragment order.
    pub warnings: Vec<IngestWarning>,
    pub entity_count: usize,
    pub relationship_count: usize,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Fragments: {} applied, {} skipped",
            self.fragments_applied, self.fragments_skipped
        )?;
        writeln!(
            f,
            "Graph:     {} entities, {} relationships",
            self.entity_count, self.relationship_count
        )?;
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:  {}", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  - {warning}")?;
            }
        }
        Ok(())
    }
}

/// Single-writer builder that applies fragment results in index order.
pub struct GraphBuilder {
    graph: KnowledgeGraph,
    policy: ResolutionConfig,
    /// Added to session-local fragment indexes to form provenance ids.
    fragment_base: usize,
    buffer: ReorderBuffer<Slot>,
    warnings: Vec<IngestWarning>,
    applied: usize,
    skipped: usize,
}

impl GraphBuilder {
    /// Start from an empty graph, expecting fragment 0 first.
    pub fn new(policy: ResolutionConfig) -> Self {
        Self::with_graph(KnowledgeGraph::new(), policy)
    }

    /// Continue building on top of an existing graph. Session fragment 0 is
    /// recorded after the highest fragment id the graph already carries.
    pub fn with_graph(graph: KnowledgeGraph, policy: ResolutionConfig) -> Self {
        let fragment_base = graph.next_fragment_index();
        Self {
            graph,
            policy,
            fragment_base,
            buffer: ReorderBuffer::new(),
            warnings: Vec::new(),
            applied: 0,
            skipped: 0,
        }
    }

    /// Graph built so far (fragments applied in order up to the first gap).
    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[IngestWarning] {
        &self.warnings
    }

    /// Provenance index of session fragment 0.
    pub fn fragment_base(&self) -> usize {
        self.fragment_base
    }

    /// Index of the next fragment to be applied.
    pub fn next_fragment(&self) -> usize {
        self.buffer.next_index()
    }

    /// Accept one fragment's candidates. They are applied as soon as every
    /// lower-indexed fragment has been applied or skipped.
    ///
    /// Returns `false` if a result for this index was already accepted.
    pub fn ingest(
        &mut self,
        fragment_index: usize,
        entities: Vec<EntityCandidate>,
        relationships: Vec<RelationshipCandidate>,
    ) -> bool {
        self.accept(
            fragment_index,
            Slot::Extracted(FragmentExtraction::new(entities, relationships)),
        )
    }

    /// [`ingest`](Self::ingest) for a whole extraction result.
    pub fn ingest_extraction(&mut self, fragment_index: usize, extraction: FragmentExtraction) -> bool {
        self.accept(fragment_index, Slot::Extracted(extraction))
    }

    /// Mark a fragment as skipped so later fragments are not held back.
    pub fn skip(&mut self, fragment_index: usize, reason: IngestWarning) -> bool {
        self.accept(fragment_index, Slot::Skipped(reason))
    }

    /// Apply everything still buffered, recording a warning for every index
    /// that never arrived, and hand back the graph.
    pub fn finish(mut self) -> (KnowledgeGraph, IngestSummary) {
        for (gap, index, slot) in self.buffer.drain() {
            if let Some(gap) = gap {
                let (from, to) = (*gap.start(), *gap.end());
                tracing::warn!(from, to, "fragments never arrived");
                self.warnings.push(IngestWarning::MissingFragments { from, to });
                self.skipped = self.skipped.saturating_add((to - from).saturating_add(1));
            }
            self.apply(index, slot);
        }

        let summary = IngestSummary {
            fragments_applied: self.applied,
            fragments_skipped: self.skipped,
            warnings: self.warnings,
            entity_count: self.graph.entity_count(),
            relationship_count: self.graph.relationship_count(),
        };
        tracing::info!(
            applied = summary.fragments_applied,
            skipped = summary.fragments_skipped,
            warnings = summary.warnings.len(),
            entities = summary.entity_count,
            relationships = summary.relationship_count,
            "ingestion finished"
        );
        (self.graph, summary)
    }

    fn accept(&mut self, fragment_index: usize, slot: Slot) -> bool {
        if !self.buffer.push(fragment_index, slot) {
            tracing::warn!(fragment = fragment_index, "duplicate fragment result ignored");
            return false;
        }
        while let Some((index, slot)) = self.buffer.pop_ready() {
            self.apply(index, slot);
        }
        true
    }

    fn apply(&mut self, fragment_index: usize, slot: Slot) {
        match slot {
            Slot::Extracted(extraction) => {
                self.merge_fragment(fragment_index, extraction);
                self.applied += 1;
            }
            Slot::Skipped(reason) => {
                tracing::warn!(fragment = fragment_index, %reason, "fragment skipped");
                self.warnings.push(reason);
                self.skipped += 1;
            }
        }
    }

    fn merge_fragment(&mut self, fragment_index: usize, extraction: FragmentExtraction) {
        let entities_before = self.graph.entity_count();
        let relationships_before = self.graph.relationship_count();
        let provenance = self.fragment_base.saturating_add(fragment_index);

        for message in extraction.rejected {
            tracing::debug!(fragment = fragment_index, %message, "candidate rejected by parser");
            self.warnings.push(IngestWarning::RejectedCandidate {
                fragment_index,
                message,
            });
        }

        for candidate in &extraction.entities {
            if candidate.name.trim().is_empty() {
                self.warnings
                    .push(IngestWarning::EmptyEntityName { fragment_index });
                continue;
            }
            self.graph
                .add_entity(candidate.to_entity(provenance), &self.policy);
        }

        for candidate in &extraction.relationships {
            self.merge_relationship(fragment_index, candidate);
        }

        tracing::debug!(
            fragment = fragment_index,
            new_entities = self.graph.entity_count() - entities_before,
            new_relationships = self.graph.relationship_count() - relationships_before,
            "fragment merged"
        );
    }

    fn merge_relationship(&mut self, fragment_index: usize, candidate: &RelationshipCandidate) {
        let source_name = candidate.source.trim();
        let target_name = candidate.target.trim();
        if source_name.is_empty() || target_name.is_empty() {
            tracing::debug!(fragment = fragment_index, "relationship with empty endpoint dropped");
            self.warnings
                .push(IngestWarning::EmptyEndpoint { fragment_index });
            return;
        }

        let mut endpoints = Vec::with_capacity(2);
        for name in [source_name, target_name] {
            match self.resolve_endpoint(fragment_index, name) {
                Some(id) => endpoints.push(id),
                None => {
                    tracing::debug!(
                        fragment = fragment_index,
                        missing = name,
                        relation = %candidate.relation_type,
                        "relationship with unresolved endpoint dropped"
                    );
                    self.warnings.push(IngestWarning::DanglingReference {
                        fragment_index,
                        source_name: source_name.to_string(),
                        target_name: target_name.to_string(),
                        relation: candidate.relation_type.clone(),
                        missing: name.to_string(),
                    });
                    return;
                }
            }
        }
        let (source_id, target_id) = (endpoints.remove(0), endpoints.remove(0));

        let mut relationship = Relationship::new(source_id, target_id, candidate.relation_type.trim())
            .with_description(candidate.description.trim());
        relationship
            .source_fragments
            .push(fragment_id(self.fragment_base.saturating_add(fragment_index)));
        if let Err(err) = self.graph.add_relationship(relationship) {
            // Endpoints were resolved against this graph, so this only fires
            // if resolution and insertion disagree.
            tracing::error!(fragment = fragment_index, %err, "relationship rejected");
            self.warnings.push(IngestWarning::DanglingReference {
                fragment_index,
                source_name: source_name.to_string(),
                target_name: target_name.to_string(),
                relation: candidate.relation_type.clone(),
                missing: err.to_string(),
            });
        }
    }

    fn resolve_endpoint(&mut self, fragment_index: usize, name: &str) -> Option<String> {
        if let Some(found) = self.graph.resolve_name(name, &self.policy) {
            return Some(found.entity_id);
        }
        if !self.policy.create_missing_endpoints {
            return None;
        }
        let mut entity = Entity::new(name);
        entity.mention_count = 1;
        entity.record_fragment(&fragment_id(self.fragment_base.saturating_add(fragment_index)));
        Some(self.graph.add_entity(entity, &self.policy))
    }
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("graph", &self.graph)
            .field("next_fragment", &self.buffer.next_index())
            .field("pending", &self.buffer.pending())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}
