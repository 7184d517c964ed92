//! Multi-source bounded traversal.
//!
//! BFS from every anchor at once with a single shared visited set, recording
//! each entity's minimum hop distance from the nearest anchor. Edges are
//! followed in both directions.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::index::KnowledgeGraph;

/// Result of a bounded traversal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraversalResult {
    /// Entity id → minimum hop distance from any anchor.
    pub distances: BTreeMap<String, usize>,
    /// Relationships whose endpoints were both visited, by id.
    pub relationships: BTreeSet<String>,
    /// Maximum depth actually reached.
    pub depth_reached: usize,
}

impl TraversalResult {
    pub fn visited(&self) -> impl Iterator<Item = &str> {
        self.distances.keys().map(String::as_str)
    }

    pub fn distance(&self, entity_id: &str) -> Option<usize> {
        self.distances.get(entity_id).copied()
    }
}

/// BFS from all `anchors` simultaneously, never going beyond `hops` edges.
///
/// Anchors not present in the graph are ignored. Every node is enqueued at
/// most once, so cycles terminate through the visited set.
pub fn traverse_bfs(graph: &KnowledgeGraph, anchors: &[String], hops: usize) -> TraversalResult {
    let mut distances: BTreeMap<String, usize> = BTreeMap::new();
    let mut depth_reached = 0;

    // BFS queue: (node, current_depth)
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();

    for anchor in anchors {
        if graph.contains_entity(anchor) && !distances.contains_key(anchor) {
            distances.insert(anchor.clone(), 0);
            queue.push_back((anchor.clone(), 0));
        }
    }

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= hops {
            continue;
        }
        for neighbor in graph.get_neighbors(&node) {
            if distances.contains_key(neighbor) {
                continue;
            }
            distances.insert(neighbor.to_string(), depth + 1);
            depth_reached = depth_reached.max(depth + 1);
            queue.push_back((neighbor.to_string(), depth + 1));
        }
    }

    let relationships = distances
        .keys()
        .flat_map(|id| graph.relationships_for(id))
        .filter(|rel| distances.contains_key(&rel.source_id) && distances.contains_key(&rel.target_id))
        .map(|rel| rel.id.clone())
        .collect();

    TraversalResult {
        distances,
        relationships,
        depth_reached,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionConfig;
    use crate::graph::{Entity, Relationship};

    fn build_chain_graph() -> KnowledgeGraph {
        // a -- b -- c -- d, plus a back edge d -- b
        let mut kg = KnowledgeGraph::new();
        for name in ["a", "b", "c", "d"] {
            kg.add_entity(Entity::new(name), &ResolutionConfig::default());
        }
        kg.add_relationship(Relationship::new("a", "b", "r")).unwrap();
        kg.add_relationship(Relationship::new("b", "c", "r")).unwrap();
        kg.add_relationship(Relationship::new("c", "d", "r")).unwrap();
        kg.add_relationship(Relationship::new("d", "b", "r")).unwrap();
        kg
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bfs_respects_hop_bound() {
        let kg = build_chain_graph();
        let result = traverse_bfs(&kg, &ids(&["a"]), 1);
        assert_eq!(result.visited().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(result.depth_reached, 1);
        assert_eq!(result.relationships.len(), 1);
    }

    #[test]
    fn bfs_follows_edges_backwards() {
        let kg = build_chain_graph();
        let result = traverse_bfs(&kg, &ids(&["c"]), 1);
        assert_eq!(result.distance("b"), Some(1));
        assert_eq!(result.distance("d"), Some(1));
        assert_eq!(result.distance("a"), None);
    }

    #[test]
    fn bfs_terminates_on_cycles() {
        let kg = build_chain_graph();
        let result = traverse_bfs(&kg, &ids(&["a"]), 10);
        assert_eq!(result.distances.len(), 4);
        assert_eq!(result.distance("d"), Some(2));
        assert_eq!(result.depth_reached, 2);
        assert_eq!(result.relationships.len(), 4);
    }

    #[test]
    fn multi_source_keeps_minimum_distance() {
        let kg = build_chain_graph();
        let result = traverse_bfs(&kg, &ids(&["a", "d"]), 2);
        assert_eq!(result.distance("a"), Some(0));
        assert_eq!(result.distance("d"), Some(0));
        assert_eq!(result.distance("b"), Some(1));
        assert_eq!(result.distance("c"), Some(1));
    }

    #[test]
    fn zero_hops_visits_only_anchors() {
        let kg = build_chain_graph();
        let result = traverse_bfs(&kg, &ids(&["b", "b", "ghost"]), 0);
        assert_eq!(result.visited().collect::<Vec<_>>(), vec!["b"]);
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn no_anchors_yields_empty_result() {
        let kg = build_chain_graph();
        assert_eq!(traverse_bfs(&kg, &[], 3), TraversalResult::default());
    }
}
