//! Graph retrieval: anchor matching, bounded traversal, ranking.
//!
//! A query is turned into seed names by a [`SeedExtractor`], the seeds are
//! matched onto graph entities with the same resolution rules used during
//! ingestion, and a multi-source BFS collects everything within `hops` of an
//! anchor. Visited entities and relationships are scored by distance, lexical
//! overlap with the query, and evidence strength; the best `top_k` entities
//! and their supporting relationships form the context.
//!
//! Retrieval only reads the graph, so any number of retrievals may run
//! against one snapshot concurrently.

pub mod context;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::collaborator::{SeedExtractor, query_token_seeds};
use crate::config::{ResolutionConfig, RetrievalConfig};
use crate::graph::KnowledgeGraph;
use crate::graph::similarity::{token_overlap, tokenize};
use crate::graph::traverse::{TraversalResult, traverse_bfs};

/// Whether retrieval found anything to traverse from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    /// At least one seed matched an entity.
    Found,
    /// No seed matched; the context is empty.
    NoAnchorMatch,
}

/// A seed name resolved to a graph entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorMatch {
    pub seed: String,
    pub entity_id: String,
    pub score: f64,
    pub exact: bool,
}

/// A ranked entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntity {
    pub entity_id: String,
    pub name: String,
    /// Hops from the nearest anchor.
    pub distance: usize,
    pub score: f64,
}

/// A ranked relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRelationship {
    pub relationship_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    pub distance: usize,
    pub score: f64,
}

/// Output of one retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub query: String,
    pub status: ContextStatus,
    /// Seed names as extracted (or query tokens on fallback).
    pub seeds: Vec<String>,
    /// Seed extraction failed and query tokens were used instead.
    pub seed_fallback: bool,
    pub anchors: Vec<AnchorMatch>,
    pub unmatched_seeds: Vec<String>,
    /// Selected entities, best first.
    pub entities: Vec<ScoredEntity>,
    /// Supporting relationships, best first.
    pub relationships: Vec<ScoredRelationship>,
    /// Text block for the answer generator.
    pub text: String,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Selected entity ids, best first.
    pub fn entity_ids(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.entity_id.as_str()).collect()
    }
}

/// Read-only retriever over a graph snapshot.
#[derive(Debug, Clone)]
pub struct GraphRetriever<'g> {
    graph: &'g KnowledgeGraph,
    resolution: ResolutionConfig,
    retrieval: RetrievalConfig,
}

impl<'g> GraphRetriever<'g> {
    pub fn new(
        graph: &'g KnowledgeGraph,
        resolution: &ResolutionConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            graph,
            resolution: resolution.clone(),
            retrieval: retrieval.clone(),
        }
    }

    /// Retrieve with the configured `hops` and `top_k`.
    pub fn retrieve(&self, query: &str, seeds: &dyn SeedExtractor) -> RetrievedContext {
        self.retrieve_with(query, seeds, self.retrieval.hops, self.retrieval.top_k)
    }

    /// Retrieve with explicit `hops` and `top_k`.
    ///
    /// If seed extraction fails, the query's own tokens are used as seeds.
    pub fn retrieve_with(
        &self,
        query: &str,
        seeds: &dyn SeedExtractor,
        hops: usize,
        top_k: usize,
    ) -> RetrievedContext {
        let (seed_names, fallback) = match seeds.extract_seeds(query) {
            Ok(names) => (names, false),
            Err(err) => {
                tracing::warn!(%err, "seed extraction failed, using query tokens");
                (query_token_seeds(query), true)
            }
        };
        let mut context = self.retrieve_from_seeds(query, &seed_names, hops, top_k);
        context.seed_fallback = fallback;
        context
    }

    /// Retrieve from already-extracted seed names.
    pub fn retrieve_from_seeds(
        &self,
        query: &str,
        seeds: &[String],
        hops: usize,
        top_k: usize,
    ) -> RetrievedContext {
        let (anchors, unmatched_seeds) = self.match_anchors(seeds);
        let mut context = RetrievedContext {
            query: query.to_string(),
            status: ContextStatus::NoAnchorMatch,
            seeds: seeds.to_vec(),
            seed_fallback: false,
            anchors,
            unmatched_seeds,
            entities: Vec::new(),
            relationships: Vec::new(),
            text: String::new(),
        };
        if context.anchors.is_empty() {
            tracing::info!(seeds = seeds.len(), "no seed matched the graph");
            return context;
        }

        let mut anchor_ids: Vec<String> = Vec::new();
        for anchor in &context.anchors {
            if !anchor_ids.contains(&anchor.entity_id) {
                anchor_ids.push(anchor.entity_id.clone());
            }
        }
        let traversal = traverse_bfs(self.graph, &anchor_ids, hops);
        let query_tokens: BTreeSet<String> = tokenize(query).into_iter().collect();

        let mut entities = self.score_entities(&traversal, &query_tokens);
        entities.truncate(top_k);
        let selected: BTreeSet<&str> = entities.iter().map(|e| e.entity_id.as_str()).collect();

        let mut relationships: Vec<ScoredRelationship> = self
            .score_relationships(&traversal, &query_tokens)
            .into_iter()
            .filter(|r| selected.contains(r.source_id.as_str()) || selected.contains(r.target_id.as_str()))
            .collect();
        if let Some(cap) = self.retrieval.max_relationships {
            relationships.truncate(cap);
        }

        context.text = context::assemble(self.graph, &entities, &relationships);
        context.status = ContextStatus::Found;
        context.entities = entities;
        context.relationships = relationships;

        tracing::debug!(
            anchors = anchor_ids.len(),
            visited = traversal.distances.len(),
            selected = context.entities.len(),
            "retrieval finished"
        );
        context
    }

    /// Resolve seed names onto entities. Unmatched seeds are returned
    /// separately, in seed order.
    pub fn match_anchors(&self, seeds: &[String]) -> (Vec<AnchorMatch>, Vec<String>) {
        let mut anchors = Vec::new();
        let mut unmatched = Vec::new();
        for seed in seeds {
            match self.graph.resolve_name(seed, &self.resolution) {
                Some(found) => anchors.push(AnchorMatch {
                    seed: seed.clone(),
                    entity_id: found.entity_id,
                    score: found.score,
                    exact: found.exact,
                }),
                None => unmatched.push(seed.clone()),
            }
        }
        (anchors, unmatched)
    }

    fn score_entities(
        &self,
        traversal: &TraversalResult,
        query_tokens: &BTreeSet<String>,
    ) -> Vec<ScoredEntity> {
        let candidates: Vec<_> = traversal
            .distances
            .iter()
            .filter_map(|(id, &distance)| self.graph.entity(id).map(|e| (e, distance)))
            .collect();
        let max_mentions = candidates
            .iter()
            .map(|(e, _)| e.mention_count as f64)
            .fold(0.0, f64::max);

        let mut scored: Vec<ScoredEntity> = candidates
            .into_iter()
            .map(|(entity, distance)| {
                let tokens: BTreeSet<String> = entity.aliases.iter().flat_map(|a| tokenize(a)).collect();
                let score = self.combine(
                    distance,
                    token_overlap(query_tokens, &tokens),
                    evidence(entity.mention_count as f64, max_mentions),
                );
                ScoredEntity {
                    entity_id: entity.id.clone(),
                    name: entity.canonical_name.clone(),
                    distance,
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        scored
    }

    fn score_relationships(
        &self,
        traversal: &TraversalResult,
        query_tokens: &BTreeSet<String>,
    ) -> Vec<ScoredRelationship> {
        let candidates: Vec<_> = traversal
            .relationships
            .iter()
            .filter_map(|id| self.graph.relationship(id))
            .collect();
        let max_weight = candidates.iter().map(|r| r.weight).fold(0.0, f64::max);
        let distances: &BTreeMap<String, usize> = &traversal.distances;

        let mut scored: Vec<ScoredRelationship> = candidates
            .into_iter()
            .map(|rel| {
                let distance = [&rel.source_id, &rel.target_id]
                    .into_iter()
                    .filter_map(|id| distances.get(id).copied())
                    .max()
                    .unwrap_or(0);
                let mut tokens: BTreeSet<String> = tokenize(&rel.relation_type).into_iter().collect();
                tokens.extend(tokenize(&rel.description));
                let score = self.combine(
                    distance,
                    token_overlap(query_tokens, &tokens),
                    evidence(rel.weight, max_weight),
                );
                ScoredRelationship {
                    relationship_id: rel.id.clone(),
                    source_id: rel.source_id.clone(),
                    target_id: rel.target_id.clone(),
                    relation_type: rel.relation_type.clone(),
                    distance,
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.relationship_id.cmp(&b.relationship_id))
        });
        scored
    }

    fn combine(&self, distance: usize, lexical: f64, evidence: f64) -> f64 {
        let r = &self.retrieval;
        r.distance_weight / (1.0 + distance as f64) + r.lexical_weight * lexical + r.evidence_weight * evidence
    }
}

/// `ln(1 + n) / ln(1 + max)`, so frequent items do not dominate linearly.
fn evidence(n: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    n.max(0.0).ln_1p() / max.ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::CollaboratorError;
    use crate::graph::{Entity, Relationship};

    struct FixedSeeds(Vec<&'static str>);

    impl SeedExtractor for FixedSeeds {
        fn extract_seeds(&self, _query: &str) -> Result<Vec<String>, CollaboratorError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct TimedOut;

    impl SeedExtractor for TimedOut {
        fn extract_seeds(&self, _query: &str) -> Result<Vec<String>, CollaboratorError> {
            Err(CollaboratorError::Timeout {
                collaborator: "seed extractor".into(),
            })
        }
    }

    fn korean_graph() -> KnowledgeGraph {
        let policy = ResolutionConfig::default();
        let mut kg = KnowledgeGraph::new();
        kg.add_entity(Entity::new("철수").with_type("PERSON"), &policy);
        kg.add_entity(Entity::new("영희").with_type("PERSON"), &policy);
        kg.add_entity(Entity::new("서울").with_type("PLACE"), &policy);
        kg.add_entity(Entity::new("부산").with_type("PLACE"), &policy);
        kg.add_entity(Entity::new("민수").with_type("PERSON"), &policy);
        kg.add_relationship(Relationship::new("철수", "영희", "friend")).unwrap();
        kg.add_relationship(Relationship::new("영희", "서울", "lives_in")).unwrap();
        kg.add_relationship(Relationship::new("민수", "부산", "lives_in")).unwrap();
        kg
    }

    fn retriever(kg: &KnowledgeGraph) -> GraphRetriever<'_> {
        GraphRetriever::new(kg, &ResolutionConfig::default(), &RetrievalConfig::default())
    }

    #[test]
    fn neighbor_of_anchor_outranks_unrelated() {
        let kg = korean_graph();
        let ctx = retriever(&kg).retrieve_with("영희는 어디 살아?", &FixedSeeds(vec!["영희"]), 1, 5);
        assert_eq!(ctx.status, ContextStatus::Found);
        assert_eq!(ctx.entity_ids()[0], "영희");
        assert!(ctx.entity_ids().contains(&"서울"));
        assert!(!ctx.entity_ids().contains(&"부산"));
        assert!(ctx.text.contains("서울"));
    }

    #[test]
    fn unmatched_seeds_are_recorded_not_fatal() {
        let kg = korean_graph();
        let ctx = retriever(&kg).retrieve_with("q", &FixedSeeds(vec!["영희", "제주"]), 1, 5);
        assert_eq!(ctx.anchors.len(), 1);
        assert_eq!(ctx.unmatched_seeds, vec!["제주"]);
    }

    #[test]
    fn no_anchor_yields_empty_context() {
        let kg = korean_graph();
        let ctx = retriever(&kg).retrieve_with("q", &FixedSeeds(vec!["제주"]), 2, 5);
        assert_eq!(ctx.status, ContextStatus::NoAnchorMatch);
        assert!(ctx.is_empty());
        assert!(ctx.relationships.is_empty());
        assert!(ctx.text.is_empty());
    }

    #[test]
    fn seed_failure_falls_back_to_query_tokens() {
        let kg = korean_graph();
        let ctx = retriever(&kg).retrieve_with("영희는 어디 살아?", &TimedOut, 1, 5);
        assert!(ctx.seed_fallback);
        assert_eq!(ctx.seeds, vec!["영희는", "어디", "살아"]);
        assert_eq!(ctx.anchors[0].entity_id, "영희");
        assert!(!ctx.anchors[0].exact);
    }

    #[test]
    fn large_top_k_returns_everything_sorted() {
        let kg = korean_graph();
        let ctx = retriever(&kg).retrieve_with("철수", &FixedSeeds(vec!["철수", "민수"]), 5, 100);
        assert_eq!(ctx.entities.len(), 5);
        for pair in ctx.entities.windows(2) {
            assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].entity_id < pair[1].entity_id)
            );
        }
        assert_eq!(ctx.relationships.len(), 3);
    }

    #[test]
    fn top_k_bounds_entities_and_filters_relationships() {
        let kg = korean_graph();
        let ctx = retriever(&kg).retrieve_with("q", &FixedSeeds(vec!["철수"]), 2, 1);
        assert_eq!(ctx.entity_ids(), vec!["철수"]);
        // Only relationships touching the selected entity support it.
        assert_eq!(ctx.relationships.len(), 1);
        assert_eq!(ctx.relationships[0].relationship_id, "철수-[friend]->영희");
    }

    #[test]
    fn relationship_cap_applies() {
        let kg = korean_graph();
        let config = RetrievalConfig {
            max_relationships: Some(1),
            ..RetrievalConfig::default()
        };
        let retriever = GraphRetriever::new(&kg, &ResolutionConfig::default(), &config);
        let ctx = retriever.retrieve_with("q", &FixedSeeds(vec!["영희"]), 1, 5);
        assert_eq!(ctx.relationships.len(), 1);
    }

    #[test]
    fn closer_entities_score_higher() {
        let kg = korean_graph();
        let ctx = retriever(&kg).retrieve_with("q", &FixedSeeds(vec!["철수"]), 2, 5);
        let distance_of = |id: &str| ctx.entities.iter().find(|e| e.entity_id == id).unwrap().distance;
        assert_eq!(distance_of("철수"), 0);
        assert_eq!(distance_of("영희"), 1);
        assert_eq!(distance_of("서울"), 2);
        assert_eq!(ctx.entity_ids(), vec!["철수", "영희", "서울"]);
    }

    #[test]
    fn evidence_is_logarithmic() {
        assert_eq!(evidence(3.0, 0.0), 0.0);
        assert!((evidence(7.0, 7.0) - 1.0).abs() < 1e-12);
        assert!(evidence(1.0, 7.0) > 1.0 / 7.0);
    }
}
