use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use studyhub::config;
use studyhub::db::{self, SqliteStore};
use studyhub::notion::{NotionClient, NotionSource};
use studyhub::sync::{run_full_sync, SyncOptions};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one full Notion-to-local sync and exit when complete"
)]
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

    let client = NotionClient::new(cfg.notion.token.clone(), cfg.notion.version.clone());
    let source = NotionSource::new(client, cfg.notion.database_id.clone());
    let store = SqliteStore::new(pool);
    let opts = SyncOptions {
        page_size: cfg.sync.page_size,
        batch_size: cfg.sync.batch_size,
    };

    info!("starting full sync");
    let summary = run_full_sync(&source, &store, opts).await?;

    println!(
        "sync complete: topics {}/{} ok ({} failed), content {}/{} ok ({} failed)",
        summary.topics.succeeded,
        summary.topics.attempted,
        summary.topics.failed,
        summary.content.succeeded,
        summary.content.attempted,
        summary.content.failed,
    );
    Ok(())
}
