use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use codemap_core::{IndexConfig, IndexResult, RepositoryService, RepositoryWatcher};

/// Index a repository and print a summary as JSON.
#[derive(Debug, Parser)]
#[command(name = "codemap", version)]
struct Args {
    /// Repository root.
    #[arg(default_value = ".")]
    root: PathBuf,

    /// JSON config file; environment overrides still apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keyword query to run after indexing.
    #[arg(long)]
    search: Option<String>,

    #[arg(long, default_value_t = 10)]
    limit: usize,

    /// Keep the index current until interrupted.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> IndexResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codemap_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::from_env()?,
    };
    let service = Arc::new(RepositoryService::new(&args.root, config)?);
    let stats = service.initialize_repository().await?;

    let mut summary = json!({
        "stats": stats,
        "naming_conventions": service.get_naming_conventions()?,
        "patterns": service.get_project_patterns()?,
        "cycles": service.find_cycles()?,
    });
    if let Some(query) = &args.search {
        summary["results"] = serde_json::to_value(service.search(query, args.limit)?)?;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.watch {
        let watcher = RepositoryWatcher::start(Arc::clone(&service))?;
        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        watcher.shutdown().await;
    }
    Ok(())
}
