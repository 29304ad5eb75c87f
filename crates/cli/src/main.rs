//! Cache maintenance CLI.
//!
//! Operates directly on the gateway's cache database: inspect entry counts
//! and versions, and purge by staleness or version. Output is JSON so it
//! pipes cleanly.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use offcast_core::{AppConfig, CacheDb};

#[derive(Parser)]
#[command(name = "offcast", about = "Inspect and maintain the offcast cache store")]
struct Cli {
    /// Cache database path; defaults to the configured one.
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Entry counts per version and kind, plus sync-queue depth.
    Stats,
    /// List cache versions currently holding entries.
    Versions,
    /// Delete cache entries.
    Purge {
        /// Delete API entries older than the configured freshness window.
        #[arg(long)]
        stale_api: bool,

        /// Delete non-media entries older than this many seconds.
        #[arg(long)]
        older_than_secs: Option<u64>,

        /// Delete one entire cache version, media included.
        #[arg(long)]
        version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = AppConfig::load()?;

    let db_path = cli.db.unwrap_or_else(|| cfg.db_path.clone());
    let cache = CacheDb::open(&db_path).await?;

    match cli.command {
        Command::Stats => {
            let stats = cache.entry_stats().await?;
            let depth = cache.queue_depth().await?;
            let out = serde_json::json!({ "entries": stats, "sync_queue_depth": depth });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Versions => {
            let versions = cache.cache_versions().await?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
        }
        Command::Purge { stale_api, older_than_secs, version } => {
            if !stale_api && older_than_secs.is_none() && version.is_none() {
                anyhow::bail!("specify at least one of --stale-api, --older-than-secs, --version");
            }

            let mut deleted = 0u64;

            if stale_api {
                let cutoff = (chrono::Utc::now()
                    - chrono::Duration::seconds(cfg.api_entry_ttl_secs as i64))
                .to_rfc3339();
                deleted += cache.purge_stale_api_entries(&cutoff).await?;
            }

            if let Some(secs) = older_than_secs {
                let cutoff = (chrono::Utc::now() - chrono::Duration::seconds(secs as i64)).to_rfc3339();
                deleted += cache.purge_entries_older_than(&cutoff).await?;
            }

            if let Some(version) = version {
                deleted += cache.delete_version(&version).await?;
            }

            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "deleted": deleted }))?);
        }
    }

    Ok(())
}
