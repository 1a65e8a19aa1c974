//! Claimforge CLI — ingest papers and query the causal claim graph.
//!
//! Usage:
//!   claimforge ingest <file> --paper-id <id> [--data-dir path]
//!   claimforge contradictions [--min-confidence 0.85]
//!   claimforge unsupported [--min-degree 0]
//!   claimforge frontier [--max-confidence 0.6] [--min-degree 3]
//!   claimforge stats

use clap::{Parser, Subcommand};
use claimforge::graph::CausalGraph;
use claimforge::storage::SqliteStore;
use claimforge::CoreConfig;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "claimforge",
    version,
    about = "Streaming claim pipeline and causal claim graph engine"
)]
struct Cli {
    /// Root directory for persisted state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a paper: dedup, extract, index, adjudicate
    Ingest {
        /// Path to the paper file (plain text)
        file: PathBuf,
        /// Paper identifier
        #[arg(long)]
        paper_id: String,
        /// DOI, if known
        #[arg(long)]
        doi: Option<String>,
        /// arXiv id, if known (e.g. 2103.12345v2)
        #[arg(long)]
        arxiv_id: Option<String>,
    },
    /// High-confidence refutation edges
    Contradictions {
        #[arg(long, default_value_t = 0.85)]
        min_confidence: f64,
    },
    /// Claims with no incoming supports edge
    Unsupported {
        #[arg(long, default_value_t = 0)]
        min_degree: usize,
    },
    /// Low-confidence edges between well-connected claims
    Frontier {
        #[arg(long, default_value_t = 0.6)]
        max_confidence: f64,
        #[arg(long, default_value_t = 3)]
        min_degree: usize,
    },
    /// Registry and graph counts
    Stats,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.data_dir {
        Some(ref dir) => CoreConfig::with_data_dir(dir),
        None => CoreConfig::default(),
    };

    let code = match cli.command {
        Commands::Ingest {
            file,
            paper_id,
            doi,
            arxiv_id,
        } => run_ingest(&config, &file, &paper_id, doi, arxiv_id),
        Commands::Contradictions { min_confidence } => {
            with_graph(&config, |graph| {
                let found = graph.find_contradictions(min_confidence);
                for (from, to, citations) in &found {
                    println!(
                        "{} -> {} (citations: {})",
                        from,
                        to,
                        citations
                            .iter()
                            .map(|c| c.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                eprintln!("{} contradiction(s)", found.len());
            })
        }
        Commands::Unsupported { min_degree } => with_graph(&config, |graph| {
            let found = graph.find_unsupported(min_degree);
            for id in &found {
                println!("{}", id);
            }
            eprintln!("{} unsupported claim(s)", found.len());
        }),
        Commands::Frontier {
            max_confidence,
            min_degree,
        } => with_graph(&config, |graph| {
            for edge in graph.find_frontier(max_confidence, min_degree) {
                println!(
                    "{} -> {} [{} conf={:.2} gap={}]",
                    edge.claim_a,
                    edge.claim_b,
                    edge.relation,
                    edge.confidence,
                    serde_json::to_string(&edge.gap_type).unwrap_or_default()
                );
            }
        }),
        Commands::Stats => run_stats(&config),
    };
    std::process::exit(code);
}

/// Open the persistent graph, hydrate the mirror, run `f`.
fn with_graph(config: &CoreConfig, f: impl FnOnce(&CausalGraph)) -> i32 {
    let store = match SqliteStore::open(config.graph_db_path(), config.event_log_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("error: cannot open graph store: {}", e);
            return 1;
        }
    };
    let graph = CausalGraph::new(store);
    if let Err(e) = graph.hydrate() {
        eprintln!("error: cannot hydrate graph: {}", e);
        return 1;
    }
    f(&graph);
    0
}

fn run_stats(config: &CoreConfig) -> i32 {
    let dedup = match claimforge::DedupRegistry::open(config.dedup_dir()) {
        Ok(dedup) => dedup,
        Err(e) => {
            eprintln!("error: cannot open dedup registry: {}", e);
            return 1;
        }
    };
    let stats = dedup.stats();
    with_graph(config, |graph| {
        println!(
            "{}",
            serde_json::json!({
                "graph": { "nodes": graph.node_count(), "edges": graph.edge_count() },
                "dedup": stats,
            })
        );
    })
}

#[cfg(not(feature = "embeddings"))]
fn run_ingest(
    _config: &CoreConfig,
    _file: &std::path::Path,
    _paper_id: &str,
    _doi: Option<String>,
    _arxiv_id: Option<String>,
) -> i32 {
    eprintln!("error: ingest requires a build with the 'embeddings' feature");
    1
}

#[cfg(feature = "embeddings")]
fn run_ingest(
    config: &CoreConfig,
    file: &std::path::Path,
    paper_id: &str,
    doi: Option<String>,
    arxiv_id: Option<String>,
) -> i32 {
    use claimforge::adjudicate::{DebateCache, PairEngine};
    use claimforge::storage::GraphStore;
    use claimforge::provider::{
        Adjudicator, AdjudicatorReply, CoreContext, Embedder, EvidenceItem, FastEmbedder,
        ProviderResult, SentenceExtractor,
    };
    use claimforge::stream::StreamOrchestrator;
    use claimforge::{
        CalibrationLayer, ClaimIndex, DedupRegistry, DuplicateStatus, Paper, PaperMetadata,
        Verdict,
    };

    /// Model-free adjudicator wiring: mid-similarity pairs stay uncertain
    /// and flagged until a model-backed adjudicator is configured.
    struct ReviewOnlyAdjudicator;

    #[async_trait::async_trait]
    impl Adjudicator for ReviewOnlyAdjudicator {
        async fn debate(
            &self,
            _a: &str,
            _b: &str,
            _evidence: &[EvidenceItem],
        ) -> ProviderResult<AdjudicatorReply> {
            Ok(AdjudicatorReply {
                verdict: Verdict::Uncertain,
                confidence: 0.5,
                transcript: vec!["no adjudicator model configured".to_string()],
            })
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    runtime.block_on(async {
        let bytes = match std::fs::read(file) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("error: cannot read {}: {}", file.display(), e);
                return 1;
            }
        };

        let embedder = match FastEmbedder::default_model() {
            Ok(embedder) => Arc::new(embedder),
            Err(e) => {
                eprintln!("error: embedding model unavailable: {}", e);
                return 1;
            }
        };

        // Dedup gate before any ingest work
        let dedup = match DedupRegistry::open(config.dedup_dir()) {
            Ok(dedup) => dedup,
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        };
        let metadata = PaperMetadata {
            doi,
            arxiv_id,
            title: Some(paper_id.to_string()),
            ..Default::default()
        };
        let preview: String = String::from_utf8_lossy(&bytes).chars().take(512).collect();
        let summary_embedding = match embedder.embed(&[preview]).await {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                eprintln!("error: embedding failed: {}", e);
                return 1;
            }
        };
        let check = match dedup.check(file, &metadata, summary_embedding.as_deref()) {
            Ok(check) => check,
            Err(e) => {
                eprintln!("error: dedup check failed: {}", e);
                return 1;
            }
        };
        if check.status != DuplicateStatus::New && !check.should_replace {
            println!("duplicate: {}", check.message);
            return 0;
        }

        // Wire the core
        let ctx = CoreContext::new(
            embedder.clone(),
            Arc::new(ReviewOnlyAdjudicator),
            Arc::new(SentenceExtractor::new()),
        );
        let index = ClaimIndex::new(embedder);
        if config.index_path().exists() {
            if let Err(e) = index.restore(config.index_path()) {
                eprintln!("error: cannot restore index: {}", e);
                return 1;
            }
        }
        let cache = match DebateCache::open(config.debate_cache_path()) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        };
        let calibration = Arc::new(CalibrationLayer::load(config.calibration_model_path()));
        let engine = Arc::new(
            PairEngine::new(index.clone(), ctx.adjudicator.clone(), cache, calibration)
                .with_prefilter(config.prefilter_low, config.prefilter_high)
                .with_deadline(config.external_deadline),
        );
        let store = match SqliteStore::open(config.graph_db_path(), config.event_log_path()) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        };
        let graph = Arc::new(CausalGraph::new(store.clone()));
        if let Err(e) = graph.hydrate() {
            eprintln!("error: {}", e);
            return 1;
        }

        // Paper node with full metadata; the stream's own paper write is a
        // no-op once this exists
        let paper = Paper {
            paper_id: paper_id.to_string(),
            title: paper_id.to_string(),
            doi: metadata.doi.clone(),
            arxiv_id: metadata.arxiv_id.clone(),
            raw_text: Some(String::from_utf8_lossy(&bytes).into_owned()),
            summary_embedding: summary_embedding.clone(),
            ..Default::default()
        };
        if let Err(e) = graph.add_paper(&paper) {
            eprintln!("error: paper write failed: {}", e);
            return 1;
        }

        let orchestrator = StreamOrchestrator::new(ctx, index.clone(), engine, graph, config);
        let stream = match orchestrator.process_paper_stream(&bytes, paper_id).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        };

        let (claims, summary) = match stream.collect().await {
            Ok(done) => done,
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        };
        for claim in &claims {
            println!("{}  [{}] {}", claim.id, claim.claim_type, claim.text);
        }

        if let Err(e) = index.snapshot(config.index_path()) {
            eprintln!("error: index snapshot failed: {}", e);
            return 1;
        }
        if let Err(e) = dedup.register(paper_id, file, &metadata, summary_embedding) {
            eprintln!("error: dedup registration failed: {}", e);
            return 1;
        }
        let _ = store.close();

        println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
        0
    })
}
