//! Configuration for entity resolution, ingestion and retrieval.
//!
//! Persisted as TOML with one table per concern:
//!
//! ```toml
//! [resolution]
//! fuzzy_threshold = 0.8
//! prefer_longer_canonical = true
//!
//! [retrieval]
//! hops = 2
//! top_k = 5
//!
//! [ingest]
//! workers = 4
//! ```
//!
//! Every field has a default, so partial files are valid.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(tgr::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(tgr::config::parse),
        help("Check the TOML syntax. Unknown tables and keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(tgr::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(tgr::config::invalid), help("Fix the value and try again. {message}"))]
    Invalid { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Entity-resolution policy knobs shared by ingestion and anchor matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfig {
    /// Minimum similarity for a fuzzy name match, in `(0, 1]`.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Replace the canonical name with a strictly longer matching name.
    #[serde(default = "default_true")]
    pub prefer_longer_canonical: bool,
    /// Shortest name (in characters) that may score by substring containment.
    #[serde(default = "default_min_containment_chars")]
    pub min_containment_chars: usize,
    /// Create bare entities for unresolved relationship endpoints instead of
    /// dropping the relationship.
    #[serde(default)]
    pub create_missing_endpoints: bool,
}

/// Retrieval defaults and scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Traversal depth.
    #[serde(default = "default_hops")]
    pub hops: usize,
    /// Number of entities kept in the context.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_evidence_weight")]
    pub evidence_weight: f64,
    /// Optional cap on supporting relationships.
    #[serde(default)]
    pub max_relationships: Option<usize>,
    /// Answer returned when no seed matched the graph.
    #[serde(default = "default_insufficient_answer")]
    pub insufficient_context_answer: String,
}

/// Extraction worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Concurrent extraction calls.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Retries after a failed extraction call.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RagConfig {
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

fn default_fuzzy_threshold() -> f64 {
    0.8
}
fn default_true() -> bool {
    true
}
fn default_min_containment_chars() -> usize {
    2
}
fn default_hops() -> usize {
    2
}
fn default_top_k() -> usize {
    5
}
fn default_distance_weight() -> f64 {
    0.5
}
fn default_lexical_weight() -> f64 {
    0.3
}
fn default_evidence_weight() -> f64 {
    0.2
}
fn default_insufficient_answer() -> String {
    "Insufficient information: no entity in the question was found in the knowledge graph."
        .into()
}
fn default_workers() -> usize {
    4
}
fn default_max_retries() -> usize {
    2
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            prefer_longer_canonical: true,
            min_containment_chars: default_min_containment_chars(),
            create_missing_endpoints: false,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hops: default_hops(),
            top_k: default_top_k(),
            distance_weight: default_distance_weight(),
            lexical_weight: default_lexical_weight(),
            evidence_weight: default_evidence_weight(),
            max_relationships: None,
            insufficient_context_answer: default_insufficient_answer(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
        }
    }
}

impl RagConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject values that would make resolution or scoring meaningless.
    pub fn validate(&self) -> ConfigResult<()> {
        let threshold = self.resolution.fuzzy_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid {
                message: format!("resolution.fuzzy_threshold must be in (0, 1], got {threshold}"),
            });
        }
        let r = &self.retrieval;
        for (name, weight) in [
            ("distance_weight", r.distance_weight),
            ("lexical_weight", r.lexical_weight),
            ("evidence_weight", r.evidence_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!("retrieval.{name} must be a finite non-negative number"),
                });
            }
        }
        if self.ingest.workers == 0 {
            return Err(ConfigError::Invalid {
                message: "ingest.workers must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RagConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retrieval.hops, 2);
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.resolution.prefer_longer_canonical);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: RagConfig = toml::from_str(
            "[resolution]\nfuzzy_threshold = 0.9\n\n[retrieval]\ntop_k = 3\n",
        )
        .unwrap();
        assert_eq!(config.resolution.fuzzy_threshold, 0.9);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.hops, 2);
        assert_eq!(config.ingest.workers, 4);
    }

    #[test]
    fn unknown_keys_rejected() {
        let parsed: Result<RagConfig, _> = toml::from_str("[retrieval]\ntopk = 3\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = RagConfig::default();
        config.resolution.fuzzy_threshold = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = RagConfig::default();
        config.retrieval.lexical_weight = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.ingest.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tgr.toml");
        let mut config = RagConfig::default();
        config.retrieval.max_relationships = Some(8);
        config.save(&path).unwrap();
        let loaded = RagConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
