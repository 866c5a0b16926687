use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use lyceum::core;
use lyceum::core::config::{AppConfig, AppPaths, ConfigService};
use lyceum::rag::{
    Budget, BudgetMode, BuilderConfig, ContextBuilder, Embedder, HttpEmbedder, IndexBuilder,
    IndexHandle, Orchestrator, Query,
};

#[derive(Debug, Parser)]
#[command(version, about = "Hybrid local and web passage retrieval", rename_all = "kebab")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Retrieve passages for a question and print them as JSON.
    Query {
        text: String,
        /// Prefer passages by this author.
        #[arg(long)]
        focus: Option<String>,
        /// Budget mode: fast or full.
        #[arg(long, default_value = "fast")]
        mode: BudgetMode,
        /// Print citation-formatted context instead of JSON.
        #[arg(long)]
        context: bool,
    },
    /// Chunk and embed a directory of texts into a vector index.
    BuildIndex {
        #[arg(long, value_name = "DIR")]
        input: PathBuf,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let paths = Arc::new(AppPaths::new());
    let service = ConfigService::new(paths.clone());
    let config = service.load_config().context("Failed to load configuration")?;
    core::logging::init(&paths, &config.logging.level);

    match args.command {
        Command::Query {
            text,
            focus,
            mode,
            context,
        } => {
            let mut query = Query::new(text);
            if let Some(focus) = focus {
                query = query.with_focus(focus);
            }
            run_query(&service, &config, query, mode, context).await
        }
        Command::BuildIndex { input, output } => {
            let output = output.unwrap_or_else(|| service.index_dir(&config));
            build_index(&config, &input, &output).await
        }
        Command::Config => {
            let redacted = service.redacted(&config);
            println!("{}", serde_json::to_string_pretty(&redacted)?);
            Ok(())
        }
    }
}

fn embedder(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
    let embedder = HttpEmbedder::from_config(&config.embedding)
        .context("Failed to create embedding client")?;
    Ok(embedder.map(|e| Arc::new(e) as Arc<dyn Embedder>))
}

async fn run_query(
    service: &ConfigService,
    config: &AppConfig,
    query: Query,
    mode: BudgetMode,
    render_context: bool,
) -> anyhow::Result<()> {
    let index = IndexHandle::load(&service.index_dir(config));
    let orchestrator = Orchestrator::from_config(config, index, embedder(config)?)
        .context("Failed to initialize retrieval")?;

    let budget = Budget::for_mode(orchestrator.retrieval_config(), mode);
    let bundle = orchestrator.retrieve(&query, budget).await?;

    if bundle.degraded {
        tracing::warn!(causes = ?bundle.diagnostics.causes, "Retrieval degraded");
    }

    if render_context {
        let builder = ContextBuilder::new(config.context.clone());
        println!("{}", builder.render(&bundle, &query.text));
    } else {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
    }
    Ok(())
}

async fn build_index(
    config: &AppConfig,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let embedder = embedder(config)?
        .context("Building an index requires embedding.endpoint to be configured")?;
    let builder = IndexBuilder::new(embedder, BuilderConfig::default());

    let manifest = builder
        .build(input, output)
        .await
        .with_context(|| format!("Failed to build index from {}", input.display()))?;
    tracing::info!(
        chunks = manifest.chunk_count,
        dimension = manifest.dimension,
        "Index written to {}",
        output.display()
    );
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
