//! In-memory knowledge graph with derived alias and adjacency indexes.
//!
//! Entities and relationships live in insertion-ordered arenas addressed by
//! stable string ids. Two derived indexes are maintained on every mutation and
//! rebuilt wholesale after structural edits (merges, loads):
//!
//! - alias index: normalized alias → owning entity id (the entity whose id is
//!   the alias, otherwise the earliest entity)
//! - adjacency index: entity id → ids of incident relationships

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::ResolutionConfig;
use crate::error::GraphError;

use super::similarity::{normalize_name, similarity};
use super::{Entity, Relationship, relationship_id};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// How a name resolved to an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    /// Id of the matched entity.
    pub entity_id: String,
    /// Similarity score; 1.0 for exact matches.
    pub score: f64,
    /// Whether the normalized name equals one of the entity's aliases.
    pub exact: bool,
}

/// Summary counts for a graph.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relationship_count: usize,
    /// Entity count per type; untyped entities are counted under `"UNTYPED"`.
    pub entity_types: BTreeMap<String, usize>,
    /// Entities with no incident relationships.
    pub isolated_entities: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Entities:      {}", self.entity_count)?;
        writeln!(f, "Relationships: {}", self.relationship_count)?;
        writeln!(f, "Isolated:      {}", self.isolated_entities)?;
        for (entity_type, count) in &self.entity_types {
            writeln!(f, "  {entity_type}: {count}")?;
        }
        Ok(())
    }
}

/// In-memory knowledge graph.
#[derive(Clone, Default)]
pub struct KnowledgeGraph {
    entities: Vec<Entity>,
    /// Entity id → slot in `entities`.
    entity_slots: HashMap<String, usize>,
    relationships: Vec<Relationship>,
    /// Relationship id → slot in `relationships`.
    relationship_slots: HashMap<String, usize>,
    /// Normalized alias → owning entity id.
    alias_index: HashMap<String, String>,
    /// Entity id → incident relationship ids.
    adjacency: HashMap<String, BTreeSet<String>>,
}

impl KnowledgeGraph {
    /// Create a new empty knowledge graph.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn entity(&self, entity_id: &str) -> Option<&Entity> {
        self.entity_slots
            .get(entity_id)
            .map(|&slot| &self.entities[slot])
    }

    pub fn relationship(&self, relationship_id: &str) -> Option<&Relationship> {
        self.relationship_slots
            .get(relationship_id)
            .map(|&slot| &self.relationships[slot])
    }

    pub fn contains_entity(&self, entity_id: &str) -> bool {
        self.entity_slots.contains_key(entity_id)
    }

    /// Entities in insertion order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Relationships in insertion order.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Neighboring entity ids, treating every edge as undirected. O(degree).
    pub fn get_neighbors(&self, entity_id: &str) -> BTreeSet<&str> {
        let Some(edges) = self.adjacency.get(entity_id) else {
            return BTreeSet::new();
        };
        edges
            .iter()
            .filter_map(|rid| self.relationship(rid))
            .map(|rel| rel.other_end(entity_id))
            .filter(|other| *other != entity_id)
            .collect()
    }

    /// Relationships incident to an entity, ordered by relationship id.
    pub fn relationships_for(&self, entity_id: &str) -> Vec<&Relationship> {
        self.adjacency
            .get(entity_id)
            .map(|edges| edges.iter().filter_map(|rid| self.relationship(rid)).collect())
            .unwrap_or_default()
    }

    /// Look up an entity by exact (normalized) name or alias.
    pub fn get_entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.alias_index
            .get(&normalize_name(name))
            .and_then(|id| self.entity(id))
    }

    /// Resolve a surface name: exact alias match first, then the best fuzzy
    /// match at or above `policy.fuzzy_threshold`.
    ///
    /// Fuzzy ties are broken by higher mention count, then lower entity id.
    pub fn resolve_name(&self, name: &str, policy: &ResolutionConfig) -> Option<NameMatch> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return None;
        }
        if let Some(id) = self.alias_index.get(&normalized) {
            return Some(NameMatch {
                entity_id: id.clone(),
                score: 1.0,
                exact: true,
            });
        }

        let mut best: Option<(f64, u64, &str)> = None;
        for (alias, id) in &self.alias_index {
            let score = similarity(&normalized, alias, policy.min_containment_chars);
            if score < policy.fuzzy_threshold {
                continue;
            }
            let mentions = self.entity(id).map(|e| e.mention_count).unwrap_or(0);
            let better = match best {
                None => true,
                Some((best_score, best_mentions, best_id)) => score
                    .total_cmp(&best_score)
                    .then(mentions.cmp(&best_mentions))
                    .then(best_id.cmp(id.as_str()))
                    .is_gt(),
            };
            if better {
                best = Some((score, mentions, id.as_str()));
            }
        }

        best.map(|(score, _, id)| NameMatch {
            entity_id: id.to_string(),
            score,
            exact: false,
        })
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Insert `candidate` as a new entity, or merge it into the entity its name
    /// (or one of its aliases) resolves to. Returns the resulting entity id.
    ///
    /// Only a match through the candidate's own name can replace the canonical
    /// name, and only when `policy.prefer_longer_canonical` is set and the new
    /// name is strictly longer (in characters).
    pub fn add_entity(&mut self, candidate: Entity, policy: &ResolutionConfig) -> String {
        // Exact name, then exact alias, then fuzzy name.
        let name = normalize_name(&candidate.canonical_name);
        let target = if let Some(id) = self.alias_index.get(&name) {
            Some((id.clone(), true))
        } else if let Some(id) = candidate
            .aliases
            .iter()
            .find_map(|alias| self.alias_index.get(&normalize_name(alias)))
        {
            Some((id.clone(), false))
        } else {
            self.resolve_name(&candidate.canonical_name, policy)
                .map(|m| (m.entity_id, true))
        };

        match target {
            Some((id, via_name)) => {
                self.merge_candidate(&id, candidate, via_name, policy);
                id
            }
            None => self.insert_new(candidate),
        }
    }

    /// Insert a relationship whose endpoints must already exist.
    ///
    /// A relationship with the same `(source, target, type)` triple is merged:
    /// its weight increases and provenance is appended.
    pub fn add_relationship(&mut self, mut relationship: Relationship) -> GraphResult<String> {
        relationship.id = relationship_id(
            &relationship.source_id,
            &relationship.target_id,
            &relationship.relation_type,
        );
        for endpoint in [&relationship.source_id, &relationship.target_id] {
            if !self.contains_entity(endpoint) {
                return Err(GraphError::DanglingReference {
                    relationship: relationship.id.clone(),
                    entity_id: endpoint.clone(),
                });
            }
        }

        let id = relationship.id.clone();
        if let Some(&slot) = self.relationship_slots.get(&id) {
            self.relationships[slot].absorb(&relationship);
            return Ok(id);
        }

        for endpoint in [&relationship.source_id, &relationship.target_id] {
            self.adjacency
                .entry(endpoint.clone())
                .or_default()
                .insert(id.clone());
        }
        self.relationship_slots
            .insert(id.clone(), self.relationships.len());
        self.relationships.push(relationship);
        Ok(id)
    }

    /// Fold `duplicate` into `canonical`, remapping its relationships.
    ///
    /// Relationships that would collapse onto an existing `(source, target,
    /// type)` edge are merged; relationships that would become self-loops only
    /// because of the merge are dropped. Returns `false` when either entity is
    /// missing or both ids are the same.
    pub fn merge_entities(&mut self, canonical: &str, duplicate: &str) -> bool {
        if canonical == duplicate || !self.contains_entity(canonical) {
            return false;
        }
        let Some(&dup_slot) = self.entity_slots.get(duplicate) else {
            return false;
        };
        let dup = self.entities.remove(dup_slot);
        self.entity_slots = slot_map(self.entities.iter().map(|e| e.id.as_str()));
        let Some(&slot) = self.entity_slots.get(canonical) else {
            return false;
        };

        let target = &mut self.entities[slot];
        for alias in &dup.aliases {
            target.add_alias(alias);
        }
        for (key, value) in &dup.attributes {
            target.merge_attribute(key, value.clone());
        }
        if target.entity_type.is_none() {
            target.entity_type = dup.entity_type.clone();
        }
        target.merge_description(&dup.description);
        target.mention_count += dup.mention_count;
        for fragment in &dup.source_fragments {
            target.record_fragment(fragment);
        }

        let old = std::mem::take(&mut self.relationships);
        let mut merged: Vec<Relationship> = Vec::with_capacity(old.len());
        let mut slots: HashMap<String, usize> = HashMap::with_capacity(old.len());
        for mut rel in old {
            let was_loop = rel.source_id == rel.target_id;
            if rel.source_id == duplicate {
                rel.source_id = canonical.to_string();
            }
            if rel.target_id == duplicate {
                rel.target_id = canonical.to_string();
            }
            if !was_loop && rel.source_id == rel.target_id {
                continue;
            }
            rel.id = relationship_id(&rel.source_id, &rel.target_id, &rel.relation_type);
            match slots.get(&rel.id) {
                Some(&existing) => merged[existing].absorb(&rel),
                None => {
                    slots.insert(rel.id.clone(), merged.len());
                    merged.push(rel);
                }
            }
        }
        self.relationships = merged;

        self.reindex();
        tracing::debug!(canonical, duplicate, "merged entities");
        true
    }

    /// Check structural invariants: unique ids, canonical name among aliases,
    /// and every relationship endpoint present.
    pub fn validate(&self) -> GraphResult<()> {
        let mut seen = BTreeSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.id.as_str()) {
                return Err(GraphError::MalformedGraphFile {
                    origin: "graph".into(),
                    message: format!("duplicate entity id \"{}\"", entity.id),
                });
            }
            if !entity.aliases.contains(&entity.canonical_name) {
                return Err(GraphError::MalformedGraphFile {
                    origin: "graph".into(),
                    message: format!(
                        "entity \"{}\" canonical name is not among its aliases",
                        entity.id
                    ),
                });
            }
        }
        for rel in &self.relationships {
            for endpoint in [&rel.source_id, &rel.target_id] {
                if !self.contains_entity(endpoint) {
                    return Err(GraphError::DanglingReference {
                        relationship: rel.id.clone(),
                        entity_id: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// One past the highest `fragment-N` provenance id recorded on any entity
    /// or relationship; 0 for a graph without fragment provenance.
    pub fn next_fragment_index(&self) -> usize {
        self.entities
            .iter()
            .flat_map(|e| &e.source_fragments)
            .chain(self.relationships.iter().flat_map(|r| &r.source_fragments))
            .filter_map(|f| f.strip_prefix("fragment-")?.parse::<usize>().ok())
            .max()
            .map_or(0, |highest| highest.saturating_add(1))
    }

    /// Counts per entity type plus totals.
    pub fn stats(&self) -> GraphStats {
        let mut entity_types = BTreeMap::new();
        for entity in &self.entities {
            let key = entity
                .entity_type
                .clone()
                .unwrap_or_else(|| "UNTYPED".to_string());
            *entity_types.entry(key).or_insert(0) += 1;
        }
        let isolated_entities = self
            .entities
            .iter()
            .filter(|e| self.adjacency.get(&e.id).is_none_or(|edges| edges.is_empty()))
            .count();
        GraphStats {
            entity_count: self.entities.len(),
            relationship_count: self.relationships.len(),
            entity_types,
            isolated_entities,
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Build a graph from stored records, deriving every index from scratch.
    pub(crate) fn from_parts(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
    ) -> GraphResult<Self> {
        let mut graph = Self {
            entities,
            relationships,
            ..Self::default()
        };
        graph.reindex();
        if graph.entity_slots.len() != graph.entities.len() {
            return Err(GraphError::MalformedGraphFile {
                origin: "graph".into(),
                message: "duplicate entity ids".into(),
            });
        }
        if graph.relationship_slots.len() != graph.relationships.len() {
            return Err(GraphError::MalformedGraphFile {
                origin: "graph".into(),
                message: "duplicate relationship ids".into(),
            });
        }
        graph.validate()?;
        Ok(graph)
    }

    fn insert_new(&mut self, mut candidate: Entity) -> String {
        candidate.id = super::entity_id(&candidate.canonical_name);
        let canonical = candidate.canonical_name.clone();
        if !candidate.aliases.iter().any(|a| *a == canonical) {
            candidate.aliases.retain(|a| normalize_name(a) != normalize_name(&canonical));
            candidate.aliases.insert(0, canonical);
        }
        candidate.mention_count = candidate.mention_count.max(1);

        let id = candidate.id.clone();
        let slot = self.entities.len();
        self.entity_slots.insert(id.clone(), slot);
        for alias in candidate.normalized_aliases() {
            self.register_alias(alias, &id, slot);
        }
        self.entities.push(candidate);
        id
    }

    fn merge_candidate(
        &mut self,
        id: &str,
        candidate: Entity,
        via_name: bool,
        policy: &ResolutionConfig,
    ) {
        let Some(&slot) = self.entity_slots.get(id) else {
            return;
        };
        let entity = &mut self.entities[slot];

        for alias in &candidate.aliases {
            entity.add_alias(alias);
        }
        entity.add_alias(&candidate.canonical_name);

        if via_name
            && policy.prefer_longer_canonical
            && candidate.canonical_name.chars().count() > entity.canonical_name.chars().count()
        {
            let name = normalize_name(&candidate.canonical_name);
            if let Some(display) = entity.aliases.iter().find(|a| normalize_name(a) == name) {
                entity.canonical_name = display.clone();
            }
        }

        if entity.entity_type.is_none() {
            entity.entity_type = candidate.entity_type.clone();
        }
        for (key, value) in candidate.attributes {
            entity.merge_attribute(&key, value);
        }
        entity.merge_description(&candidate.description);

        let fresh: Vec<&String> = candidate
            .source_fragments
            .iter()
            .filter(|f| !entity.source_fragments.contains(f))
            .collect();
        entity.mention_count += if candidate.source_fragments.is_empty() {
            candidate.mention_count.max(1)
        } else {
            fresh.len() as u64
        };
        for fragment in fresh {
            entity.record_fragment(fragment);
        }

        let aliases: Vec<String> = entity.normalized_aliases().collect();
        for alias in aliases {
            self.register_alias(alias, id, slot);
        }
    }

    /// A shared alias belongs to the entity whose id it is; otherwise the
    /// earliest entity (by slot) owns it.
    fn register_alias(&mut self, alias: String, id: &str, slot: usize) {
        match self.alias_index.get(&alias) {
            Some(owner) if owner == id => {}
            Some(owner) => {
                let owner_slot = self.entity_slots.get(owner).copied().unwrap_or(usize::MAX);
                let claim = (*id != alias, slot);
                if claim < (*owner != alias, owner_slot) {
                    self.alias_index.insert(alias, id.to_string());
                }
            }
            None => {
                self.alias_index.insert(alias, id.to_string());
            }
        }
    }

    /// Rebuild every derived index from the arenas.
    fn reindex(&mut self) {
        self.entity_slots = slot_map(self.entities.iter().map(|e| e.id.as_str()));
        self.relationship_slots = slot_map(self.relationships.iter().map(|r| r.id.as_str()));

        self.alias_index.clear();
        let claims: Vec<(String, String, usize)> = self
            .entities
            .iter()
            .enumerate()
            .flat_map(|(slot, e)| e.normalized_aliases().map(move |a| (a, e.id.clone(), slot)))
            .collect();
        for (alias, id, slot) in claims {
            self.register_alias(alias, &id, slot);
        }

        self.adjacency.clear();
        for rel in &self.relationships {
            for endpoint in [&rel.source_id, &rel.target_id] {
                self.adjacency
                    .entry(endpoint.clone())
                    .or_default()
                    .insert(rel.id.clone());
            }
        }
    }
}

/// First occurrence of each id wins its slot.
fn slot_map<'a>(ids: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    let mut slots = HashMap::new();
    for (slot, id) in ids.enumerate() {
        slots.entry(id.to_string()).or_insert(slot);
    }
    slots
}

impl PartialEq for KnowledgeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.entities == other.entities && self.relationships == other.relationships
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("entities", &self.entity_count())
            .field("relationships", &self.relationship_count())
            .finish()
    }
}
