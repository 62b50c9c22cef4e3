use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use studyhub::config;
use studyhub::db;
use studyhub::insight::InsightClient;
use studyhub::notion::NotionClient;
use studyhub::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let notion = NotionClient::new(cfg.notion.token.clone(), cfg.notion.version.clone());
    let insight = InsightClient::new(cfg.gemini.api_key.clone(), cfg.gemini.model.clone());

    info!(model = %cfg.gemini.model, "starting studyhub server");
    server::serve(AppState {
        config: Arc::new(cfg),
        pool,
        notion,
        insight,
    })
    .await
}
