// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # tiny-graph-rag
//!
//! Knowledge-graph retrieval-augmented generation core: builds a graph of
//! entities and relationships from per-fragment extraction output, and
//! retrieves ranked subgraph context for answering questions.
//!
//! ## Architecture
//!
//! - **Graph** (`graph`): entity/relationship arena with alias and adjacency
//!   indexes, deterministic JSON persistence, bounded traversal
//! - **Builder** (`builder`): entity resolution and merge, fragment reorder
//!   buffer, extraction worker pool, advisor-driven global alias merge
//! - **Retrieval** (`retrieve`): anchor matching, multi-source BFS, scoring
//!   and context assembly
//! - **Collaborators** (`collaborator`): extractor, seed extractor, answer
//!   generator and merge advisor boundaries
//!
//! ## Library usage
//!
//! ```no_run
//! use tiny_graph_rag::collaborator::QueryTokenSeeds;
//! use tiny_graph_rag::config::RagConfig;
//! use tiny_graph_rag::engine::GraphRag;
//!
//! let rag = GraphRag::load(RagConfig::default(), "graph.json".as_ref()).unwrap();
//! let context = rag.retrieve("영희는 어디 살아?", &QueryTokenSeeds);
//! println!("{}", context.text);
//! ```

pub mod builder;
pub mod collaborator;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod extraction;
pub mod graph;
pub mod retrieve;
