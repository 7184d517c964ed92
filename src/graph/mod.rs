//! Knowledge Graph: entity/relationship arena with an explicit adjacency index.
//!
//! - **Records** ([`Entity`], [`Relationship`]): plain data addressed by stable
//!   string ids. Relationships reference entities by id only.
//! - **Graph** ([`KnowledgeGraph`]): owns the records plus derived alias and
//!   adjacency indexes that are kept in step with every mutation.
//! - **Persistence** ([`storage`]): deterministic JSON snapshot format.

pub mod index;
pub mod similarity;
pub mod storage;
pub mod traverse;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use index::{GraphStats, KnowledgeGraph, NameMatch};
pub use similarity::normalize_name;

/// Scalar attribute value attached to an entity.
pub type AttributeValue = serde_json::Value;

/// Fragment id recorded in provenance for a fragment index.
pub fn fragment_id(fragment_index: usize) -> String {
    format!("fragment-{fragment_index}")
}

/// Stable entity id for a surface name.
pub fn entity_id(name: &str) -> String {
    normalize_name(name)
}

/// Stable relationship id: one edge per `(source, target, type)` triple.
pub fn relationship_id(source_id: &str, target_id: &str, relation_type: &str) -> String {
    format!("{source_id}-[{}]->{target_id}", normalize_name(relation_type))
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Normalized form of the first canonical name; never changes.
    pub id: String,
    /// Display name chosen by the merge policy. Always one of `aliases`.
    pub canonical_name: String,
    /// Free-form category label (PERSON, PLACE, ...).
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    /// Accumulated free-text description.
    #[serde(default)]
    pub description: String,
    /// Every surface name observed, unique by normalized form.
    pub aliases: Vec<String>,
    /// Additive key/value attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Number of fragments that mentioned this entity.
    pub mention_count: u64,
    /// Fragment ids contributing evidence, in merge order.
    pub source_fragments: Vec<String>,
}

impl Entity {
    /// Create a fresh entity whose canonical name is `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into().trim().to_string();
        Self {
            id: entity_id(&name),
            aliases: vec![name.clone()],
            canonical_name: name,
            entity_type: None,
            description: String::new(),
            attributes: BTreeMap::new(),
            mention_count: 0,
            source_fragments: Vec::new(),
        }
    }

    /// Set the entity type.
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Record an alias. Returns `false` if an alias with the same normalized
    /// form is already present.
    pub fn add_alias(&mut self, alias: &str) -> bool {
        let alias = alias.trim();
        if alias.is_empty() {
            return false;
        }
        let normalized = normalize_name(alias);
        if self.aliases.iter().any(|a| normalize_name(a) == normalized) {
            return false;
        }
        self.aliases.push(alias.to_string());
        true
    }

    /// Normalized forms of all aliases.
    pub fn normalized_aliases(&self) -> impl Iterator<Item = String> + '_ {
        self.aliases.iter().map(|a| normalize_name(a))
    }

    /// Insert an attribute only if the key is not yet present.
    pub fn merge_attribute(&mut self, key: &str, value: AttributeValue) {
        self.attributes.entry(key.to_string()).or_insert(value);
    }

    /// Overwrite an attribute explicitly.
    pub fn update_attribute(&mut self, key: &str, value: AttributeValue) {
        self.attributes.insert(key.to_string(), value);
    }

    /// Append a description fragment unless it is already contained.
    pub fn merge_description(&mut self, description: &str) {
        merge_text(&mut self.description, description);
    }

    /// Append a fragment id to provenance if not already recorded.
    pub fn record_fragment(&mut self, fragment: &str) {
        if !self.source_fragments.iter().any(|f| f == fragment) {
            self.source_fragments.push(fragment.to_string());
        }
    }
}

/// A relationship between two entities.
///
/// Stored with a direction for display; traversal treats it as undirected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// `"{source_id}-[{type}]->{target_id}"`.
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Free-form relation label ("married to", "WORKS_FOR").
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Evidence snippets joined with `"; "`.
    #[serde(default)]
    pub description: String,
    /// Observation strength; never decreases.
    pub weight: f64,
    /// Fragment ids contributing evidence, in merge order.
    pub source_fragments: Vec<String>,
}

impl Relationship {
    /// Create a relationship with weight 1.0 and no provenance.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        let source_id = source_id.into();
        let target_id = target_id.into();
        let relation_type = relation_type.into();
        Self {
            id: relationship_id(&source_id, &target_id, &relation_type),
            source_id,
            target_id,
            relation_type,
            description: String::new(),
            weight: 1.0,
            source_fragments: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The endpoint opposite `entity_id`.
    pub fn other_end(&self, entity_id: &str) -> &str {
        if self.source_id == entity_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }

    /// Fold a repeated observation into this edge.
    pub fn absorb(&mut self, other: &Relationship) {
        self.weight += other.weight.max(0.0);
        merge_text(&mut self.description, &other.description);
        for fragment in &other.source_fragments {
            if !self.source_fragments.contains(fragment) {
                self.source_fragments.push(fragment.clone());
            }
        }
    }
}

fn merge_text(target: &mut String, addition: &str) {
    let addition = addition.trim();
    if addition.is_empty() || target.contains(addition) {
        return;
    }
    if !target.is_empty() {
        target.push_str("; ");
    }
    target.push_str(addition);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_normalized_name() {
        let entity = Entity::new("  John  Doe ");
        assert_eq!(entity.id, "john doe");
        assert_eq!(entity.canonical_name, "John  Doe");
        assert_eq!(entity.aliases, vec!["John  Doe".to_string()]);
    }

    #[test]
    fn aliases_are_unique_by_normalized_form() {
        let mut entity = Entity::new("김첨지");
        assert!(entity.add_alias("남편"));
        assert!(!entity.add_alias(" 남편 "));
        assert!(!entity.add_alias("김첨지"));
        assert!(!entity.add_alias("  "));
        assert_eq!(entity.aliases.len(), 2);
    }

    #[test]
    fn attributes_are_additive() {
        let mut entity = Entity::new("Acme");
        entity.merge_attribute("founded", serde_json::json!(1990));
        entity.merge_attribute("founded", serde_json::json!(2001));
        assert_eq!(entity.attributes["founded"], serde_json::json!(1990));
        entity.update_attribute("founded", serde_json::json!(2001));
        assert_eq!(entity.attributes["founded"], serde_json::json!(2001));
    }

    #[test]
    fn descriptions_accumulate_once() {
        let mut entity = Entity::new("John").with_description("Works at Acme");
        entity.merge_description("Lives in NYC");
        entity.merge_description("Lives in NYC");
        assert_eq!(entity.description, "Works at Acme; Lives in NYC");
    }

    #[test]
    fn relationship_id_collapses_type_spelling() {
        let a = Relationship::new("철수", "영희", "friend");
        let b = Relationship::new("철수", "영희", " Friend ");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, "철수-[friend]->영희");
        assert_eq!(a.other_end("영희"), "철수");
    }

    #[test]
    fn absorb_increments_weight_and_provenance() {
        let mut edge = Relationship::new("a", "b", "knows");
        edge.source_fragments.push(fragment_id(0));
        let mut again = Relationship::new("a", "b", "knows").with_description("met at school");
        again.source_fragments.push(fragment_id(2));
        edge.absorb(&again);
        assert_eq!(edge.weight, 2.0);
        assert_eq!(edge.source_fragments, vec!["fragment-0", "fragment-2"]);
        assert_eq!(edge.description, "met at school");
    }
}
