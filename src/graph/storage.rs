//! Deterministic JSON persistence.
//!
//! The file is a single object `{ "entities": [...], "relationships": [...] }`
//! with both arrays in insertion order. Derived indexes are never stored; they
//! are rebuilt on load, and a file that breaks referential integrity is
//! rejected as a whole.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

use super::index::{GraphResult, KnowledgeGraph};
use super::{Entity, Relationship, relationship_id};

#[derive(Serialize)]
struct GraphFileRef<'a> {
    entities: &'a [Entity],
    relationships: &'a [Relationship],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GraphFile {
    entities: Vec<Entity>,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

/// Encode a graph as pretty-printed JSON with a trailing newline.
pub fn serialize(graph: &KnowledgeGraph) -> GraphResult<String> {
    let file = GraphFileRef {
        entities: graph.entities(),
        relationships: graph.relationships(),
    };
    let mut json = serde_json::to_string_pretty(&file).map_err(|e| GraphError::Serialization {
        message: e.to_string(),
    })?;
    json.push('\n');
    Ok(json)
}

/// Decode a graph, rebuilding every index from the stored records.
///
/// `origin` names the source in error messages.
pub fn deserialize(json: &str, origin: &str) -> GraphResult<KnowledgeGraph> {
    let malformed = |message: String| GraphError::MalformedGraphFile {
        origin: origin.to_string(),
        message,
    };

    let file: GraphFile = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;

    for entity in &file.entities {
        if entity.id.is_empty() {
            return Err(malformed("entity with empty id".into()));
        }
    }
    for rel in &file.relationships {
        let expected = relationship_id(&rel.source_id, &rel.target_id, &rel.relation_type);
        if rel.id != expected {
            return Err(malformed(format!(
                "relationship id \"{}\" does not match its endpoints (expected \"{expected}\")",
                rel.id
            )));
        }
    }

    KnowledgeGraph::from_parts(file.entities, file.relationships).map_err(|e| match e {
        GraphError::DanglingReference {
            relationship,
            entity_id,
        } => malformed(format!(
            "relationship \"{relationship}\" references unknown entity \"{entity_id}\""
        )),
        GraphError::MalformedGraphFile { message, .. } => malformed(message),
        other => other,
    })
}

/// Write a graph to `path`, creating parent directories.
pub fn save(graph: &KnowledgeGraph, path: &Path) -> GraphResult<()> {
    let json = serialize(graph)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GraphError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    std::fs::write(path, json).map_err(|e| GraphError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    tracing::info!(
        path = %path.display(),
        entities = graph.entity_count(),
        relationships = graph.relationship_count(),
        "graph saved"
    );
    Ok(())
}

/// Read a graph from `path`. Nothing is returned unless the whole file is valid.
pub fn load(path: &Path) -> GraphResult<KnowledgeGraph> {
    let json = std::fs::read_to_string(path).map_err(|e| GraphError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let graph = deserialize(&json, &path.display().to_string())?;
    tracing::info!(
        path = %path.display(),
        entities = graph.entity_count(),
        relationships = graph.relationship_count(),
        "graph loaded"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionConfig;
    use crate::graph::fragment_id;

    fn sample() -> KnowledgeGraph {
        let policy = ResolutionConfig::default();
        let mut kg = KnowledgeGraph::new();
        let mut chulsoo = Entity::new("철수").with_type("PERSON");
        chulsoo.source_fragments.push(fragment_id(0));
        chulsoo.merge_attribute("age", serde_json::json!(30));
        kg.add_entity(chulsoo, &policy);
        kg.add_entity(Entity::new("영희").with_type("PERSON"), &policy);
        kg.add_relationship(Relationship::new("철수", "영희", "friend").with_description("친구"))
            .unwrap();
        kg
    }

    #[test]
    fn serialize_round_trip_is_stable() {
        let kg = sample();
        let json = serialize(&kg).unwrap();
        let back = deserialize(&json, "test").unwrap();
        assert_eq!(back, kg);
        assert_eq!(serialize(&back).unwrap(), json);
        assert_eq!(back.get_neighbors("영희").len(), 1);
    }

    #[test]
    fn entity_keys_keep_declared_order() {
        let json = serialize(&sample()).unwrap();
        let id = json.find("\"id\"").unwrap();
        let canonical = json.find("\"canonical_name\"").unwrap();
        let provenance = json.find("\"source_fragments\"").unwrap();
        assert!(id < canonical && canonical < provenance);
    }

    #[test]
    fn dangling_relationship_is_malformed() {
        let json = r#"{
            "entities": [{"id": "a", "canonical_name": "a", "type": null,
                          "aliases": ["a"], "mention_count": 1, "source_fragments": []}],
            "relationships": [{"id": "a-[knows]->b", "source_id": "a", "target_id": "b",
                               "type": "knows", "weight": 1.0, "source_fragments": []}]
        }"#;
        let err = deserialize(json, "inline").unwrap_err();
        assert!(matches!(err, GraphError::MalformedGraphFile { ref origin, .. } if origin == "inline"));
    }

    #[test]
    fn duplicate_entity_ids_are_malformed() {
        let json = r#"{
            "entities": [
                {"id": "a", "canonical_name": "a", "type": null, "aliases": ["a"],
                 "mention_count": 1, "source_fragments": []},
                {"id": "a", "canonical_name": "A", "type": null, "aliases": ["A"],
                 "mention_count": 1, "source_fragments": []}
            ],
            "relationships": []
        }"#;
        assert!(matches!(
            deserialize(json, "inline"),
            Err(GraphError::MalformedGraphFile { .. })
        ));
    }

    #[test]
    fn not_json_is_malformed() {
        assert!(matches!(
            deserialize("[1, 2, 3]", "inline"),
            Err(GraphError::MalformedGraphFile { .. })
        ));
    }
}
