//! Rich diagnostic error types for the graph RAG core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Ingestion problems that must not abort a
//! run are modelled separately as [`IngestWarning`]s and surfaced in a summary.

use miette::Diagnostic;
use thiserror::Error;

pub use crate::collaborator::CollaboratorError;
pub use crate::config::ConfigError;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum RagError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("relationship \"{relationship}\" references unknown entity \"{entity_id}\"")]
    #[diagnostic(
        code(tgr::graph::dangling_reference),
        help(
            "Both endpoints of a relationship must exist before the relationship is added. \
             Insert the entity first, or drop the relationship candidate."
        )
    )]
    DanglingReference {
        relationship: String,
        entity_id: String,
    },

    #[error("malformed graph file {origin}: {message}")]
    #[diagnostic(
        code(tgr::graph::malformed_file),
        help(
            "The persisted graph violates referential integrity or is not valid graph JSON. \
             Rebuild it with `tgr ingest`; a partially loaded graph is never used."
        )
    )]
    MalformedGraphFile { origin: String, message: String },

    #[error("I/O error on {path}")]
    #[diagnostic(
        code(tgr::graph::io),
        help("Check that the file exists and that you have read/write permissions.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(tgr::graph::serde),
        help("The graph could not be encoded as JSON.")
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Ingestion errors
// ---------------------------------------------------------------------------

/// Fatal ingestion errors. Per-fragment problems are [`IngestWarning`]s instead.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("failed to start extraction worker pool: {message}")]
    #[diagnostic(
        code(tgr::ingest::worker_pool),
        help("Lower `ingest.workers` in the configuration or check system thread limits.")
    )]
    WorkerPool { message: String },

    #[error("failed to read extraction file {path}: {message}")]
    #[diagnostic(
        code(tgr::ingest::extraction_file),
        help(
            "The extraction file must be a JSON array of \
             {{ index, entities, relationships }} objects."
        )
    )]
    ExtractionFile { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Evaluation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EvalError {
    #[error("failed to read evaluation dataset {path}: {message}")]
    #[diagnostic(
        code(tgr::eval::dataset),
        help(
            "The dataset must be a JSON array or JSON lines of \
             {{ \"query\", \"reference_entities\" }} records."
        )
    )]
    Dataset { path: String, message: String },

    #[error("failed to write evaluation report: {message}")]
    #[diagnostic(code(tgr::eval::report))]
    Report { message: String },
}

/// A non-fatal problem recorded while ingesting fragments.
///
/// Warnings are accumulated in the ingestion summary; they never abort a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestWarning {
    #[error("fragment {fragment_index}: extraction output unusable: {message}")]
    ParseFailure {
        fragment_index: usize,
        message: String,
    },

    #[error("fragment {fragment_index}: entity candidate with empty name dropped")]
    EmptyEntityName { fragment_index: usize },

    #[error("fragment {fragment_index}: candidate dropped: {message}")]
    RejectedCandidate {
        fragment_index: usize,
        message: String,
    },

    #[error(
        "fragment {fragment_index}: relationship {source_name:?} -[{relation}]-> {target_name:?} \
         dropped, endpoint {missing:?} not found"
    )]
    DanglingReference {
        fragment_index: usize,
        source_name: String,
        target_name: String,
        relation: String,
        missing: String,
    },

    #[error("fragment {fragment_index}: relationship candidate with empty endpoint dropped")]
    EmptyEndpoint { fragment_index: usize },

    #[error("fragments {from}..={to} never arrived; later fragments were applied without them")]
    MissingFragments { from: usize, to: usize },
}

impl IngestWarning {
    /// Index of the fragment the warning belongs to (the first one for a
    /// run of missing fragments).
    pub fn fragment_index(&self) -> usize {
        match self {
            Self::ParseFailure { fragment_index, .. }
            | Self::EmptyEntityName { fragment_index }
            | Self::RejectedCandidate { fragment_index, .. }
            | Self::DanglingReference { fragment_index, .. }
            | Self::EmptyEndpoint { fragment_index } => *fragment_index,
            Self::MissingFragments { from, .. } => *from,
        }
    }
}

/// Convenience alias for functions returning crate results.
pub type RagResult<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_rag_error() {
        let err = GraphError::MalformedGraphFile {
            origin: "graph.json".into(),
            message: "duplicate entity ids".into(),
        };
        let rag: RagError = err.into();
        assert!(matches!(rag, RagError::Graph(GraphError::MalformedGraphFile { .. })));
    }

    #[test]
    fn dangling_reference_message_names_both_sides() {
        let err = GraphError::DanglingReference {
            relationship: "a-[knows]->b".into(),
            entity_id: "b".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("a-[knows]->b"));
        assert!(msg.contains("\"b\""));
    }

    #[test]
    fn warning_reports_fragment_index() {
        let warning = IngestWarning::DanglingReference {
            fragment_index: 3,
            source_name: "철수".into(),
            target_name: "민수".into(),
            relation: "friend".into(),
            missing: "민수".into(),
        };
        assert_eq!(warning.fragment_index(), 3);
        assert!(warning.to_string().contains("민수"));
    }

    #[test]
    fn missing_run_reports_its_bounds() {
        let warning = IngestWarning::MissingFragments { from: 2, to: 9 };
        assert_eq!(warning.fragment_index(), 2);
        assert!(warning.to_string().contains("2..=9"));
    }
}
