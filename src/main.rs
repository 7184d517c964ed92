//! tgr CLI: build and query a knowledge graph for retrieval-augmented generation.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use tiny_graph_rag::collaborator::QueryTokenSeeds;
use tiny_graph_rag::config::RagConfig;
use tiny_graph_rag::engine::GraphRag;
use tiny_graph_rag::eval;
use tiny_graph_rag::extraction::ExtractionFile;
use tiny_graph_rag::retrieve::{ContextStatus, RetrievedContext};

#[derive(Parser)]
#[command(name = "tgr", version, about = "Knowledge-graph RAG core")]
struct Cli {
    /// Configuration file (TOML). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Persisted graph file.
    #[arg(long, global = true, default_value = "graph.json")]
    graph: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph from an extraction file.
    Ingest {
        /// JSON array of {index, text, entities, relationships} records.
        #[arg(long)]
        extractions: PathBuf,

        /// Merge into the existing graph instead of starting empty.
        #[arg(long)]
        append: bool,

        /// Override the number of extraction workers.
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Retrieve ranked context for a question.
    Query {
        /// The question.
        query: String,

        /// Seed entity names (comma-separated). Query tokens are used when omitted.
        #[arg(long)]
        seeds: Option<String>,

        /// Traversal depth.
        #[arg(long)]
        hops: Option<usize>,

        /// Number of entities in the context.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full retrieval result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show graph statistics.
    Info,

    /// Run retrieval over an evaluation dataset and emit JSON-lines reports.
    Eval {
        /// JSON array or JSON-lines file of {query, reference_entities} records.
        #[arg(long)]
        dataset: PathBuf,

        /// Report file. Reports go to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Inspect or create configuration files.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write a configuration file with default values.
    Init {
        /// Destination path.
        #[arg(default_value = "tgr.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::default(),
    };

    match cli.command {
        Commands::Ingest {
            extractions,
            append,
            workers,
        } => {
            let mut config = config;
            if let Some(workers) = workers {
                config.ingest.workers = workers;
            }
            let file = ExtractionFile::load(&extractions)?;
            let mut rag = if append && cli.graph.exists() {
                GraphRag::load(config, &cli.graph)?
            } else {
                GraphRag::new(config)?
            };

            let summary = rag.ingest(file.fragments(), &file)?;
            rag.save(&cli.graph)?;

            print!("{summary}");
            println!("Saved graph to {}", cli.graph.display());
        }

        Commands::Query {
            query,
            seeds,
            hops,
            top_k,
            json,
        } => {
            let rag = GraphRag::load(config, &cli.graph)?;
            let hops = hops.unwrap_or(rag.config().retrieval.hops);
            let top_k = top_k.unwrap_or(rag.config().retrieval.top_k);
            let retriever = rag.retriever();

            let context = match seeds {
                Some(list) => {
                    let names: Vec<String> = list
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                    retriever.retrieve_from_seeds(&query, &names, hops, top_k)
                }
                None => retriever.retrieve_with(&query, &QueryTokenSeeds, hops, top_k),
            };

            if json {
                let out = serde_json::to_string_pretty(&context).into_diagnostic()?;
                println!("{out}");
            } else {
                print_context(&context, &rag.config().retrieval.insufficient_context_answer);
            }
        }

        Commands::Info => {
            let rag = GraphRag::load(config, &cli.graph)?;
            print!("{}", rag.info());
        }

        Commands::Eval { dataset, output } => {
            let rag = GraphRag::load(config, &cli.graph)?;
            let records = eval::load_records(&dataset)?;
            let reports = eval::evaluate(&rag, &records, &QueryTokenSeeds);
            match output {
                Some(path) => {
                    let file = std::fs::File::create(&path).into_diagnostic()?;
                    eval::write_reports(&reports, std::io::BufWriter::new(file))?;
                    println!("Wrote {} reports to {}", reports.len(), path.display());
                }
                None => eval::write_reports(&reports, std::io::stdout().lock())?,
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let out = toml::to_string_pretty(&config).into_diagnostic()?;
                print!("{out}");
            }
            ConfigAction::Init { path, force } => {
                init_config(&path, force)?;
                println!("Wrote default configuration to {}", path.display());
            }
        },
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        miette::bail!(
            help = "Pass --force to overwrite it.",
            "{} already exists",
            path.display()
        );
    }
    RagConfig::default().save(path)?;
    Ok(())
}

fn print_context(context: &RetrievedContext, insufficient: &str) {
    if context.seed_fallback {
        println!("(seed extraction failed; used query tokens)");
    }
    if !context.unmatched_seeds.is_empty() {
        println!("Unmatched seeds: {}", context.unmatched_seeds.join(", "));
    }
    if context.status == ContextStatus::NoAnchorMatch {
        println!("{insufficient}");
        return;
    }

    println!("Anchors:");
    for anchor in &context.anchors {
        let how = if anchor.exact { "exact" } else { "fuzzy" };
        println!(
            "  \"{}\" -> {} ({how}, {:.3})",
            anchor.seed, anchor.entity_id, anchor.score
        );
    }
    println!("\nRanked entities:");
    for (i, entity) in context.entities.iter().enumerate() {
        println!(
            "  {}. {} (distance: {}, score: {:.4})",
            i + 1,
            entity.name,
            entity.distance,
            entity.score
        );
    }
    println!();
    print!("{}", context.text);
}
