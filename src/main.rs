mod cli;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hsgmem::config::HsgConfig;
use hsgmem::engine::HsgEngine;
use hsgmem::memory::types::Sector;

#[derive(Parser)]
#[command(name = "hsgmem", version, about = "Hierarchical sectored memory for AI agents")]
struct Cli {
    /// Config file (default: ~/.hsgmem/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify, embed and store a memory
    Add {
        content: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Arbitrary JSON object stored with the memory
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Ranked recall across sectors and waypoints
    Query {
        text: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Restrict to a sector (repeatable)
        #[arg(long = "sector")]
        sectors: Vec<Sector>,
        #[arg(long)]
        min_salience: Option<f64>,
    },
    /// Show one memory
    Get { id: String },
    /// List memories, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        sector: Option<Sector>,
    },
    /// Delete a memory with its vectors and waypoints
    Delete { id: String },
    /// Boost a memory's salience
    Reinforce {
        id: String,
        #[arg(long)]
        boost: Option<f64>,
    },
    /// Run one decay sweep
    Decay,
    /// Remove weak waypoints
    Prune,
    /// Store a text file, splitting large documents into sections
    Ingest {
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        force_root_child: bool,
    },
    /// Memory statistics
    Stats,
    /// Show the active embedding setup
    EmbedInfo,
    /// Run scheduled decay and pruning until ctrl-c
    Run,
    /// Store a memory for an agent graph node (observe, plan, reflect, act, emotion)
    NodeStore {
        node: String,
        content: String,
        #[command(flatten)]
        scope: GraphScope,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        metadata: Option<String>,
        /// Skip the automatic reflection
        #[arg(long)]
        no_reflect: bool,
    },
    /// Recall a node's memories, ranked when --query is given
    NodeRecall {
        node: String,
        #[command(flatten)]
        scope: GraphScope,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Recent memories of every graph node
    GraphContext {
        #[command(flatten)]
        scope: GraphScope,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Store a reflection, synthesized from graph context when no content is given
    Reflect {
        content: Option<String>,
        #[command(flatten)]
        scope: GraphScope,
        /// Memory the reflection draws on (repeatable)
        #[arg(long = "context-id")]
        context_ids: Vec<String>,
    },
}

#[derive(Args)]
struct GraphScope {
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    graph: Option<String>,
}

impl From<GraphScope> for cli::graph::Scope {
    fn from(scope: GraphScope) -> Self {
        Self {
            namespace: scope.namespace,
            graph_id: scope.graph,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HsgConfig::load_from(path)?,
        None => HsgConfig::load()?,
    };

    // stderr keeps stdout clean for --json output
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let engine = HsgEngine::open(config)?;
    let json = cli.json;

    match cli.command {
        Command::Add {
            content,
            tags,
            metadata,
        } => cli::add::add(&engine, &content, tags, metadata.as_deref(), json).await?,
        Command::Query {
            text,
            k,
            sectors,
            min_salience,
        } => cli::search::query(&engine, &text, k, sectors, min_salience, json).await?,
        Command::Get { id } => cli::inspect::get(&engine, &id, json).await?,
        Command::List {
            limit,
            offset,
            sector,
        } => cli::inspect::list(&engine, limit, offset, sector, json).await?,
        Command::Delete { id } => cli::inspect::delete(&engine, &id, json).await?,
        Command::Reinforce { id, boost } => {
            cli::maintenance::reinforce(&engine, &id, boost, json).await?
        }
        Command::Decay => cli::maintenance::decay(&engine, json).await?,
        Command::Prune => cli::maintenance::prune(&engine, json).await?,
        Command::Ingest {
            file,
            content_type,
            force_root_child,
        } => {
            cli::ingest::ingest(&engine, &file, content_type.as_deref(), force_root_child, json)
                .await?
        }
        Command::Stats => cli::stats::stats(&engine, json).await?,
        Command::EmbedInfo => cli::stats::embed_info(&engine, json)?,
        Command::Run => cli::maintenance::run(&engine).await?,
        Command::NodeStore {
            node,
            content,
            scope,
            tags,
            metadata,
            no_reflect,
        } => {
            cli::graph::store(
                &engine,
                &node,
                &content,
                scope.into(),
                tags,
                metadata.as_deref(),
                no_reflect,
                json,
            )
            .await?
        }
        Command::NodeRecall {
            node,
            scope,
            query,
            limit,
        } => cli::graph::recall(&engine, &node, scope.into(), query, limit, json).await?,
        Command::GraphContext { scope, limit } => {
            cli::graph::context(&engine, scope.into(), limit, json).await?
        }
        Command::Reflect {
            content,
            scope,
            context_ids,
        } => cli::graph::reflect(&engine, content, scope.into(), context_ids, json).await?,
    }

    Ok(())
}
