use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use logify_core::{KnowledgeBase, Query, QueryEngine, QueryKind, ReasonerConfig};

/// Answers a single query against a knowledge-base document
#[derive(Parser, Debug)]
#[command(name = "logify-core", version)]
#[command(about = "Entailment, consistency and confidence queries over weighted propositional knowledge bases")]
struct Args {
    /// Knowledge-base document (JSON)
    knowledge_base: PathBuf,

    /// Query formula, e.g. "P_1 ⟹ P_2"
    formula: String,

    /// entailment, consistency or confidence
    #[arg(short, long, default_value = "entailment")]
    kind: QueryKind,

    /// Reasoner configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wall-clock limit for the optimization, overrides the configuration
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the answer as JSON
    #[arg(long)]
    json: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "logify_core=debug",
        _ => "logify_core=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ReasonerConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ReasonerConfig::default(),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        config.query.timeout_ms = Some(timeout_ms);
    }

    let kb = KnowledgeBase::load(&args.knowledge_base, &config.encoder)
        .with_context(|| format!("Failed to load knowledge base {}", args.knowledge_base.display()))?;

    let engine = QueryEngine::new(Arc::new(kb)).with_config(config.query)?;
    let answer = engine.query(&Query::new(&args.formula, args.kind))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{answer}");
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
