// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use trellis::server::{ServerConfig, run_server};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(author, version, about = "Versioned property graph store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the Trellis database
    Init {
        /// Database path (default: /var/lib/trellis/trellis.db)
        #[arg(short, long, default_value = "/var/lib/trellis/trellis.db")]
        db_path: String,
    },
    /// Run the HTTP server
    Serve {
        /// Database path (default: /var/lib/trellis/trellis.db)
        #[arg(short, long, default_value = "/var/lib/trellis/trellis.db")]
        db_path: String,
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Entity cache TTL in seconds
        #[arg(long, default_value_t = 60)]
        entity_cache_ttl: u64,
        /// Principal closure cache TTL in seconds
        #[arg(long, default_value_t = 120)]
        principals_cache_ttl: u64,
        /// Accessible-ACL count above which listings switch to
        /// post-query filtering
        #[arg(long, default_value_t = 200)]
        acl_filter_cutoff: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_path } => {
            trellis::db::init(&db_path)?;
            info!("Database initialized at {}", db_path);
        }
        Commands::Serve {
            db_path,
            bind,
            entity_cache_ttl,
            principals_cache_ttl,
            acl_filter_cutoff,
        } => {
            // idempotent; brings an existing database up to date
            trellis::db::init(&db_path)?;

            let config = ServerConfig {
                bind_addr: bind.parse()?,
                db_path,
                entity_cache_ttl: Duration::from_secs(entity_cache_ttl),
                principals_cache_ttl: Duration::from_secs(principals_cache_ttl),
                acl_filter_cutoff,
            };
            run_server(config).await?;
        }
    }

    Ok(())
}
