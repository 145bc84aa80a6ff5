//! rag-fusion CLI - Reciprocal Rank Fusion and local hybrid search.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rag_core::{Embedder, RagConfig, RagError, Result, SearchBackend, SearchHit};
use rag_embed::HashingEmbedder;
use rag_query::{
    apply_pins, ranked_lists_from_json, HybridRequest, HybridSearcher, MatchCriteria,
    MemoryBackend, RankFusionEngine, Ruleset, StoredDocument,
};

/// rag-fusion - Reciprocal Rank Fusion of ranked result lists
#[derive(Parser)]
#[command(name = "rag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/rag-fusion/config.toml, then ./rag-fusion.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse ranked lists given as a JSON array of arrays of ids
    Fuse {
        /// JSON file with the ranked lists (reads stdin if not specified)
        file: Option<PathBuf>,

        /// Smoothing constant k
        #[arg(long, allow_hyphen_values = true)]
        k: Option<f64>,

        /// Leading entries of each list that count
        #[arg(long)]
        window_size: Option<usize>,

        /// Maximum number of results to print
        #[arg(short, long)]
        top: Option<usize>,

        /// Pinning rules (JSON ruleset)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Request metadata for pinning rules
        #[arg(short, long = "match", value_name = "KEY=VALUE", value_parser = parse_match)]
        matches: Vec<(String, String)>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Hybrid search over a JSON array of documents held in memory
    Search {
        /// Search query
        query: String,

        /// JSON file with documents, each an object with an "id" and text fields
        #[arg(short, long)]
        docs: PathBuf,

        /// Field embedded for the vector leg
        #[arg(long, default_value = "summary")]
        embed_field: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Restrict the vector leg to a language
        #[arg(short, long)]
        language: Option<String>,

        /// Pinning rules (JSON ruleset)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Request metadata for pinning rules
        #[arg(short, long = "match", value_name = "KEY=VALUE", value_parser = parse_match)]
        matches: Vec<(String, String)>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::load_default()?,
    };

    match cli.command {
        Commands::Fuse {
            file,
            k,
            window_size,
            top,
            rules,
            matches,
            json,
        } => {
            let engine = RankFusionEngine::new(
                k.unwrap_or(config.fusion.k),
                window_size.unwrap_or(config.fusion.window_size),
            )?;
            let input = read_input(file.as_deref())?;
            let ruleset = rules.as_deref().map(load_ruleset).transpose()?;
            let criteria: MatchCriteria = matches.into_iter().collect();

            let hits = fuse(&engine, &input, ruleset.as_ref(), &criteria, top)?;
            print_hits(&hits, json)?;
        }
        Commands::Search {
            query,
            docs,
            embed_field,
            top_k,
            language,
            rules,
            matches,
            json,
        } => {
            let hits = search(
                &config,
                &docs,
                &embed_field,
                SearchArgs {
                    query,
                    top_k,
                    language,
                    rules,
                    matches,
                },
            )
            .await?;
            print_hits(&hits, json)?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

struct SearchArgs {
    query: String,
    top_k: Option<usize>,
    language: Option<String>,
    rules: Option<PathBuf>,
    matches: Vec<(String, String)>,
}

fn parse_match(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
    }
}

fn load_ruleset(path: &Path) -> Result<Ruleset> {
    let ruleset = Ruleset::from_json(&fs::read_to_string(path)?)?;
    info!(
        "Loaded ruleset '{}' with {} rules",
        ruleset.ruleset_id,
        ruleset.rules.len()
    );
    Ok(ruleset)
}

fn fuse(
    engine: &RankFusionEngine,
    input: &str,
    ruleset: Option<&Ruleset>,
    criteria: &MatchCriteria,
    top: Option<usize>,
) -> Result<Vec<SearchHit>> {
    if top == Some(0) {
        return Err(RagError::invalid_argument("top must be > 0"));
    }

    let value: Value = serde_json::from_str(input)?;
    let lists = ranked_lists_from_json(&value)?;
    let fused = engine.fuse(&lists);

    let pinned = ruleset
        .map(|r| r.pinned_ids(criteria))
        .unwrap_or_default();

    Ok(apply_pins(fused, &pinned)
        .into_iter()
        .take(top.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(rank, entry)| SearchHit {
            rank: rank as u32 + 1,
            id: entry.id,
            score: entry.score,
            pinned: entry.pinned,
        })
        .collect())
}

fn documents_from_json(value: &Value) -> Result<Vec<StoredDocument>> {
    let items = value
        .as_array()
        .ok_or_else(|| RagError::invalid_argument("documents must be a JSON array of objects"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let object = item.as_object().ok_or_else(|| {
                RagError::invalid_argument(format!("document {} is not an object", i + 1))
            })?;
            let id = match object.get("id") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(RagError::invalid_argument(format!(
                        "document {} has no valid \"id\"",
                        i + 1
                    )))
                }
            };

            let mut doc = StoredDocument::new(id);
            for (name, field) in object.iter().filter(|(name, _)| *name != "id") {
                match field {
                    Value::String(s) => doc = doc.with_field(name.as_str(), s.as_str()),
                    other => debug!("Skipping non-text field '{}' = {}", name, other),
                }
            }
            Ok(doc)
        })
        .collect()
}

async fn search(
    config: &RagConfig,
    docs_path: &Path,
    embed_field: &str,
    args: SearchArgs,
) -> Result<Vec<SearchHit>> {
    let embedder = Arc::new(HashingEmbedder::from_config(&config.embedding)?);
    let backend = Arc::new(MemoryBackend::new());

    let value: Value = serde_json::from_str(&fs::read_to_string(docs_path)?)?;
    let documents = documents_from_json(&value)?;

    let texts: Vec<&str> = documents
        .iter()
        .map(|d| d.fields.get(embed_field).map(String::as_str).unwrap_or(""))
        .collect();
    let vectors = embedder.embed_documents(&texts).await?;

    let index = &config.search.index;
    backend.create_index(index)?;
    for (doc, vector) in documents.iter().zip(vectors) {
        let mut doc = doc.clone();
        if doc.fields.contains_key(embed_field) {
            doc = doc.with_vector(config.search.knn_field.as_str(), vector);
        }
        backend.insert(index, doc)?;
    }
    info!("Indexed {} documents into '{}'", documents.len(), index);

    let mut searcher = HybridSearcher::from_config(backend.clone(), embedder, config)?;
    if let Some(path) = &args.rules {
        searcher = searcher.with_ruleset(load_ruleset(path)?)?;
    }

    let mut request = HybridRequest::new(args.query);
    request.top_k = args.top_k;
    request.language = args.language;
    request.match_criteria = args.matches.into_iter().collect();

    let results = searcher.search(&request).await;
    backend.close().await?;

    Ok(results?.results)
}

fn render_table(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = format!("{:>4}  {:<10}  {}\n", "RANK", "SCORE", "ID");
    for hit in hits {
        out.push_str(&format!(
            "{:>4}  {:<10.6}  {}{}\n",
            hit.rank,
            hit.score,
            hit.id,
            if hit.pinned { "  (pinned)" } else { "" }
        ));
    }
    out
}

fn print_hits(hits: &[SearchHit], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
    } else {
        print!("{}", render_table(hits));
    }
    Ok(())
}
