//! Engine facade: top-level API for building and querying a graph.
//!
//! `GraphRag` owns the configuration and the current graph, and wires the
//! extraction pipeline, persistence, global alias resolution, retrieval and
//! answer generation together.

use std::path::Path;

use serde::Serialize;

use crate::builder::{ExtractionPipeline, GlobalResolution, GlobalResolver, GraphBuilder, IngestSummary};
use crate::collaborator::{AnswerGenerator, Extractor, MergeAdvisor, SeedExtractor};
use crate::config::RagConfig;
use crate::error::RagResult;
use crate::extraction::Fragment;
use crate::graph::{GraphStats, KnowledgeGraph, storage};
use crate::retrieve::{ContextStatus, GraphRetriever, RetrievedContext};

/// A generated answer together with the context it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// `false` when no anchor matched and the generator was not called.
    pub generated: bool,
    pub context: RetrievedContext,
}

/// Knowledge-graph RAG engine.
pub struct GraphRag {
    config: RagConfig,
    graph: KnowledgeGraph,
}

impl GraphRag {
    /// Create an engine with an empty graph.
    pub fn new(config: RagConfig) -> RagResult<Self> {
        Self::with_graph(config, KnowledgeGraph::new())
    }

    /// Create an engine around an existing graph.
    pub fn with_graph(config: RagConfig, graph: KnowledgeGraph) -> RagResult<Self> {
        config.validate()?;
        tracing::info!(
            entities = graph.entity_count(),
            relationships = graph.relationship_count(),
            fuzzy_threshold = config.resolution.fuzzy_threshold,
            "initializing graph rag engine"
        );
        Ok(Self { config, graph })
    }

    /// Load a persisted graph.
    pub fn load(config: RagConfig, path: &Path) -> RagResult<Self> {
        let graph = storage::load(path)?;
        Self::with_graph(config, graph)
    }

    /// Persist the current graph.
    pub fn save(&self, path: &Path) -> RagResult<()> {
        storage::save(&self.graph, path)?;
        Ok(())
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn stats(&self) -> GraphStats {
        self.graph.stats()
    }

    /// Extract and merge `fragments` into the graph.
    ///
    /// Per-fragment failures end up in the summary. The graph keeps whatever
    /// was merged even if the worker pool could not be started.
    pub fn ingest(&mut self, fragments: &[Fragment], extractor: &dyn Extractor) -> RagResult<IngestSummary> {
        let pipeline = ExtractionPipeline::new(&self.config.ingest);
        let mut builder = GraphBuilder::with_graph(
            std::mem::take(&mut self.graph),
            self.config.resolution.clone(),
        );
        let outcome = pipeline.run(fragments, extractor, &mut builder);
        let (graph, summary) = builder.finish();
        self.graph = graph;
        outcome?;
        Ok(summary)
    }

    /// Merge aliases the incremental resolver cannot see, as advised.
    pub fn resolve_aliases(
        &mut self,
        resolver: &GlobalResolver,
        advisor: &dyn MergeAdvisor,
    ) -> GlobalResolution {
        resolver.resolve(&mut self.graph, advisor)
    }

    /// Read-only retriever over the current graph.
    pub fn retriever(&self) -> GraphRetriever<'_> {
        GraphRetriever::new(&self.graph, &self.config.resolution, &self.config.retrieval)
    }

    /// Retrieve context with the configured `hops` and `top_k`.
    pub fn retrieve(&self, query: &str, seeds: &dyn SeedExtractor) -> RetrievedContext {
        self.retriever().retrieve(query, seeds)
    }

    /// Retrieve context and generate an answer from it.
    ///
    /// When no seed matched the graph, the configured insufficient-context
    /// answer is returned and the generator is not called.
    pub fn answer(
        &self,
        query: &str,
        seeds: &dyn SeedExtractor,
        generator: &dyn AnswerGenerator,
    ) -> RagResult<Answer> {
        let context = self.retrieve(query, seeds);
        if context.status == ContextStatus::NoAnchorMatch {
            return Ok(Answer {
                text: self.config.retrieval.insufficient_context_answer.clone(),
                generated: false,
                context,
            });
        }
        let text = generator.generate(&context.text, query)?;
        Ok(Answer {
            text,
            generated: true,
            context,
        })
    }

    /// Summary of the engine state.
    pub fn info(&self) -> String {
        format!(
            "tiny-graph-rag engine\n  hops: {}\n  top_k: {}\n  fuzzy threshold: {}\n{}",
            self.config.retrieval.hops,
            self.config.retrieval.top_k,
            self.config.resolution.fuzzy_threshold,
            self.graph.stats(),
        )
    }
}

impl std::fmt::Debug for GraphRag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRag")
            .field("graph", &self.graph)
            .field("hops", &self.config.retrieval.hops)
            .field("top_k", &self.config.retrieval.top_k)
            .finish()
    }
}
