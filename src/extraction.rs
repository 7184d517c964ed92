//! Extraction candidates and the parser for raw model output.
//!
//! A model-backed extractor answers with a JSON object of the form
//! `{ "entities": [...], "relationships": [...] }`. [`parse_extraction`]
//! turns that payload into typed candidates, tolerating missing arrays and
//! junk entries. Endpoint resolution is left to the graph builder.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborator::{CollaboratorError, Extractor};
use crate::error::IngestError;
use crate::graph::{AttributeValue, Entity, fragment_id};

/// Entity types the extractor is asked to use. Anything else becomes `OTHER`.
pub const ENTITY_TYPES: [&str; 6] = [
    "PERSON",
    "ORGANIZATION",
    "PLACE",
    "CONCEPT",
    "EVENT",
    "OTHER",
];

/// A unit of source text processed independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub index: usize,
    pub text: String,
}

impl Fragment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Provenance id, `"fragment-{index}"`.
    pub fn id(&self) -> String {
        fragment_id(self.index)
    }
}

/// An unvalidated entity mention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl EntityCandidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Build the entity record this candidate contributes for one fragment.
    pub fn to_entity(&self, fragment_index: usize) -> Entity {
        let mut entity = Entity::new(self.name.trim()).with_description(self.description.trim());
        entity.entity_type = self
            .entity_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);
        for alias in &self.aliases {
            entity.add_alias(alias);
        }
        for (key, value) in &self.attributes {
            entity.merge_attribute(key, value.clone());
        }
        entity.mention_count = 1;
        entity.record_fragment(&fragment_id(fragment_index));
        entity
    }
}

/// An unvalidated relationship mention between two surface names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub description: String,
}

impl RelationshipCandidate {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Everything extracted from one fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentExtraction {
    #[serde(default)]
    pub entities: Vec<EntityCandidate>,
    #[serde(default)]
    pub relationships: Vec<RelationshipCandidate>,
    /// Entries the parser could not turn into candidates, one message each.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
}

impl FragmentExtraction {
    pub fn new(entities: Vec<EntityCandidate>, relationships: Vec<RelationshipCandidate>) -> Self {
        Self {
            entities,
            relationships,
            rejected: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Map a free-form entity type onto [`ENTITY_TYPES`], case-insensitively.
pub fn normalize_entity_type(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if ENTITY_TYPES.contains(&upper.as_str()) {
        upper
    } else {
        "OTHER".to_string()
    }
}

/// Upper-snake-case a relationship label (`"works for"` → `WORKS_FOR`).
pub fn normalize_relation_type(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Parse a raw extraction payload into candidates.
///
/// Missing (or `null`) arrays are treated as empty. A payload that is not a
/// JSON object, or an `entities`/`relationships` field that is not an array,
/// is malformed. Entries that are not objects, and entities without a name,
/// are dropped and listed in [`FragmentExtraction::rejected`].
pub fn parse_extraction(
    value: &Value,
    fragment_index: usize,
) -> Result<FragmentExtraction, CollaboratorError> {
    let Some(object) = value.as_object() else {
        return Err(CollaboratorError::malformed(
            "extractor",
            format!("fragment {fragment_index}: expected a JSON object"),
        ));
    };

    let entities = array_field(object, "entities", fragment_index)?;
    let relationships = array_field(object, "relationships", fragment_index)?;
    let mut extraction = FragmentExtraction::default();

    for (i, raw) in entities.iter().enumerate() {
        if !raw.is_object() {
            extraction.rejected.push(format!("entities[{i}] is not an object"));
            continue;
        }
        let name = str_field(raw, "name");
        if name.is_empty() {
            tracing::debug!(fragment = fragment_index, "skipping entity without name");
            extraction.rejected.push(format!("entities[{i}] has no name"));
            continue;
        }
        let mut candidate = EntityCandidate::new(name)
            .with_description(str_field(raw, "description"));
        candidate.entity_type = Some(normalize_entity_type(&str_field(raw, "type")));
        if let Some(aliases) = raw.get("aliases").and_then(Value::as_array) {
            candidate.aliases = aliases
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(attributes) = raw.get("attributes").and_then(Value::as_object) {
            candidate.attributes = attributes
                .iter()
                .filter(|(_, v)| !v.is_null() && !v.is_array() && !v.is_object())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        extraction.entities.push(candidate);
    }

    for (i, raw) in relationships.iter().enumerate() {
        if !raw.is_object() {
            extraction
                .rejected
                .push(format!("relationships[{i}] is not an object"));
            continue;
        }
        let relation_type = normalize_relation_type(&str_field(raw, "type"));
        let relation_type = if relation_type.is_empty() {
            "RELATED_TO".to_string()
        } else {
            relation_type
        };
        extraction.relationships.push(
            RelationshipCandidate::new(str_field(raw, "source"), str_field(raw, "target"), relation_type)
                .with_description(str_field(raw, "description")),
        );
    }

    Ok(extraction)
}

fn array_field<'a>(
    object: &'a serde_json::Map<String, Value>,
    key: &str,
    fragment_index: usize,
) -> Result<&'a [Value], CollaboratorError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(CollaboratorError::malformed(
            "extractor",
            format!("fragment {fragment_index}: `{key}` must be an array, got {other}"),
        )),
    }
}

fn str_field(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

// ── ExtractionFile ──────────────────────────────────────────────────────

/// One record of an offline extraction file.
#[derive(Debug, Clone, Deserialize)]
struct ExtractionRecord {
    index: usize,
    #[serde(default)]
    text: String,
    #[serde(flatten)]
    payload: serde_json::Map<String, Value>,
}

/// Pre-computed extraction output, one record per fragment.
///
/// The file is a JSON array of `{ "index", "text"?, "entities",
/// "relationships" }` objects. Each record's payload goes through
/// [`parse_extraction`] when its fragment is extracted, so a bad record only
/// fails its own fragment.
#[derive(Debug, Clone, Default)]
pub struct ExtractionFile {
    fragments: Vec<Fragment>,
    payloads: HashMap<usize, Value>,
}

impl ExtractionFile {
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path).map_err(|e| IngestError::ExtractionFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|message| IngestError::ExtractionFile {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parse the file contents. Duplicate indexes are rejected.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let records: Vec<ExtractionRecord> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;
        let mut file = Self::default();
        for record in records {
            if file.payloads.contains_key(&record.index) {
                return Err(format!("duplicate fragment index {}", record.index));
            }
            file.fragments.push(Fragment::new(record.index, record.text));
            file.payloads.insert(record.index, Value::Object(record.payload));
        }
        file.fragments.sort_by_key(|f| f.index);
        Ok(file)
    }

    /// Fragments in ascending index order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }
}

impl Extractor for ExtractionFile {
    fn extract(&self, fragment: &Fragment) -> Result<FragmentExtraction, CollaboratorError> {
        let payload = self.payloads.get(&fragment.index).ok_or_else(|| {
            CollaboratorError::failed(
                "extraction file",
                format!("no record for fragment {}", fragment.index),
            )
        })?;
        parse_extraction(payload, fragment.index)
    }
}
