//! Context text assembly for the answer generator.

use std::fmt::Write;

use serde_json::Value;

use crate::graph::KnowledgeGraph;

use super::{ScoredEntity, ScoredRelationship};

/// Attributes shown per entity.
const MAX_ATTRIBUTES: usize = 5;

/// Render selected entities and their supporting relationships as a
/// markdown-ish block, in ranking order.
pub fn assemble(
    graph: &KnowledgeGraph,
    entities: &[ScoredEntity],
    relationships: &[ScoredRelationship],
) -> String {
    let mut out = String::new();
    if entities.is_empty() {
        return out;
    }

    out.push_str("## Knowledge Graph Context\n\n### Entities\n");
    for scored in entities {
        let Some(entity) = graph.entity(&scored.entity_id) else {
            continue;
        };
        let _ = write!(out, "- {}", entity.canonical_name);
        if let Some(entity_type) = &entity.entity_type {
            let _ = write!(out, " [{entity_type}]");
        }
        let others: Vec<&str> = entity
            .aliases
            .iter()
            .filter(|a| **a != entity.canonical_name)
            .map(String::as_str)
            .collect();
        if !others.is_empty() {
            let _ = write!(out, " (also: {})", others.join(", "));
        }
        if !entity.description.is_empty() {
            let _ = write!(out, ": {}", entity.description);
        }
        out.push('\n');

        for (key, value) in entity.attributes.iter().take(MAX_ATTRIBUTES) {
            let _ = writeln!(out, "  - {key}: {}", display_value(value));
        }
    }

    if !relationships.is_empty() {
        out.push_str("\n### Relationships\n");
        for scored in relationships {
            let Some(rel) = graph.relationship(&scored.relationship_id) else {
                continue;
            };
            let _ = write!(
                out,
                "- {} -[{}]-> {}",
                display_name(graph, &rel.source_id),
                rel.relation_type,
                display_name(graph, &rel.target_id)
            );
            if !rel.description.is_empty() {
                let _ = write!(out, ": {}", rel.description);
            }
            out.push('\n');
        }
    }
    out
}

fn display_name<'a>(graph: &'a KnowledgeGraph, entity_id: &'a str) -> &'a str {
    graph
        .entity(entity_id)
        .map(|e| e.canonical_name.as_str())
        .unwrap_or(entity_id)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
