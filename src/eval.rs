//! Evaluation datasets and retrieval reports.
//!
//! Records pair a query with the entities a good retrieval should surface.
//! The crate only produces per-query reports; scoring them is left to
//! external tooling.

use std::io::Write;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::collaborator::SeedExtractor;
use crate::engine::GraphRag;
use crate::error::EvalError;
use crate::retrieve::{ContextStatus, ScoredEntity};

/// One evaluation question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub query: String,
    #[serde(default)]
    pub reference_entities: Vec<String>,
    /// Seed names to use instead of calling the seed extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds: Option<Vec<String>>,
}

/// What retrieval returned for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub query: String,
    pub reference_entities: Vec<String>,
    pub status: ContextStatus,
    pub seed_fallback: bool,
    pub retrieved: Vec<ScoredEntity>,
}

/// Parse a dataset given either as a JSON array or as JSON lines.
pub fn parse_records(content: &str) -> Result<Vec<EvalRecord>, String> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| e.to_string());
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| serde_json::from_str(line).map_err(|e| format!("line {}: {e}", n + 1)))
        .collect()
}

/// Load a dataset file.
pub fn load_records(path: &Path) -> Result<Vec<EvalRecord>, EvalError> {
    let dataset_error = |message: String| EvalError::Dataset {
        path: path.display().to_string(),
        message,
    };
    let content = std::fs::read_to_string(path).map_err(|e| dataset_error(e.to_string()))?;
    parse_records(&content).map_err(dataset_error)
}

/// Run retrieval for every record. Records are independent and run in
/// parallel against the same graph; reports come back in record order.
pub fn evaluate(rag: &GraphRag, records: &[EvalRecord], seeds: &dyn SeedExtractor) -> Vec<EvalReport> {
    let retriever = rag.retriever();
    let (hops, top_k) = (rag.config().retrieval.hops, rag.config().retrieval.top_k);
    records
        .par_iter()
        .map(|record| {
            let context = match &record.seeds {
                Some(fixed) => retriever.retrieve_from_seeds(&record.query, fixed, hops, top_k),
                None => retriever.retrieve_with(&record.query, seeds, hops, top_k),
            };
            EvalReport {
                query: record.query.clone(),
                reference_entities: record.reference_entities.clone(),
                status: context.status,
                seed_fallback: context.seed_fallback,
                retrieved: context.entities,
            }
        })
        .collect()
}

/// Write reports as JSON lines.
pub fn write_reports<W: Write>(reports: &[EvalReport], mut out: W) -> Result<(), EvalError> {
    for report in reports {
        let line = serde_json::to_string(report).map_err(|e| EvalError::Report {
            message: e.to_string(),
        })?;
        writeln!(out, "{line}").map_err(|e| EvalError::Report {
            message: e.to_string(),
        })?;
    }
    Ok(())
}
