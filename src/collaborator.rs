//! Boundaries to the external model-backed collaborators.
//!
//! The core never talks to a language model directly. Extraction, seed
//! extraction, answer generation and merge advice are injected through the
//! traits below, so ingestion and retrieval can be driven by real clients,
//! offline extraction files, or test doubles alike.

use miette::Diagnostic;
use thiserror::Error;

use crate::builder::global::{MergeCandidate, MergeGroup};
use crate::extraction::{Fragment, FragmentExtraction};
use crate::graph::similarity::tokenize;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out")]
    #[diagnostic(
        code(tgr::collaborator::timeout),
        help("The call may be retried; retrieval falls back to query tokens.")
    )]
    Timeout { collaborator: String },

    #[error("{collaborator} failed: {message}")]
    #[diagnostic(code(tgr::collaborator::failed))]
    Failed {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} returned malformed output: {message}")]
    #[diagnostic(
        code(tgr::collaborator::malformed),
        help("Expected a JSON object with `entities` and `relationships` arrays.")
    )]
    Malformed {
        collaborator: String,
        message: String,
    },
}

impl CollaboratorError {
    pub fn failed(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn malformed(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

// ── Traits ──────────────────────────────────────────────────────────────

/// Produces entity and relationship candidates for one fragment.
///
/// Called concurrently from the extraction worker pool.
pub trait Extractor: Send + Sync {
    fn extract(&self, fragment: &Fragment) -> Result<FragmentExtraction, CollaboratorError>;
}

/// Pulls candidate entity names out of a query, most salient first.
pub trait SeedExtractor: Send + Sync {
    fn extract_seeds(&self, query: &str) -> Result<Vec<String>, CollaboratorError>;
}

/// Writes the final answer from assembled context.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, context: &str, query: &str) -> Result<String, CollaboratorError>;
}

/// Proposes groups of entities that name the same real-world thing.
pub trait MergeAdvisor: Send + Sync {
    fn propose_merges(
        &self,
        candidates: &[MergeCandidate<'_>],
    ) -> Result<Vec<MergeGroup>, CollaboratorError>;
}

// ── QueryTokenSeeds ─────────────────────────────────────────────────────

/// Seed extractor that treats every query token as a candidate name.
///
/// This is the same behavior retrieval falls back to when a model-backed
/// seed extractor fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTokenSeeds;

impl SeedExtractor for QueryTokenSeeds {
    fn extract_seeds(&self, query: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(query_token_seeds(query))
    }
}

/// Distinct query tokens in order of first appearance.
pub fn query_token_seeds(query: &str) -> Vec<String> {
    let mut seeds: Vec<String> = Vec::new();
    for token in tokenize(query) {
        if !seeds.contains(&token) {
            seeds.push(token);
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_tokens_are_deduplicated_in_order() {
        let seeds = QueryTokenSeeds.extract_seeds("영희 영희는 어디 영희?").unwrap();
        assert_eq!(seeds, vec!["영희", "영희는", "어디"]);
    }

    #[test]
    fn error_messages_name_the_collaborator() {
        let err = CollaboratorError::malformed("extractor", "expected object");
        assert_eq!(
            err.to_string(),
            "extractor returned malformed output: expected object"
        );
        let timeout = CollaboratorError::Timeout {
            collaborator: "seed extractor".into(),
        };
        assert!(timeout.to_string().contains("timed out"));
    }
}
