use std::sync::Arc;

use clap::Parser;
use parley_core::store::{ConversationStore, MemoryConversationStore, PgConversationStore};
use parley_core::ParleyConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use parley_server::http::{start_http_server, HttpState};
use parley_server::subsystems::conversation::ConversationService;
use parley_server::subsystems::keepalive::{LivenessPinger, PingerSettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "parley.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Keep conversations in process memory instead of Postgres
    #[arg(long)]
    memory_store: bool,
}

/// `RUST_LOG` replaces the default outright; INFO applies only when it is
/// unset or unparseable.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .init();

    // Load config
    let config = match ParleyConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if args.health {
        let pool = parley_core::db::create_pool(&config.database).await?;
        match parley_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }
        match parley_core::db::ensure_schema(&pool).await {
            Ok(()) => println!("✅ conversations table ready"),
            Err(e) => {
                println!("❌ Schema bootstrap failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Parley DB health check passed");
        return Ok(());
    }

    // Store: connect once; a failed connection is logged and requests fail
    // until the database is reachable. The table is created on first use.
    let store: Arc<dyn ConversationStore> = if args.memory_store {
        tracing::info!("Using in-memory conversation store");
        Arc::new(MemoryConversationStore::new())
    } else {
        let pool = parley_core::db::create_pool(&config.database).await?;
        Arc::new(PgConversationStore::new(pool))
    };

    let service = ConversationService::from_config(&config, store)?;

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Keep-alive pinger, armed after the initial delay
    let pinger = if config.keepalive.enabled {
        let settings = PingerSettings::from_config(&config.keepalive, config.http.port);
        match LivenessPinger::new(settings) {
            Ok(p) => Some(p.spawn(tx.subscribe())),
            Err(e) => {
                tracing::warn!("Keep-alive pinger skipped: {}", e);
                None
            }
        }
    } else {
        None
    };

    let state = Arc::new(HttpState { service });
    let result = start_http_server(state, &config.http, tx.subscribe()).await;

    if let Some(handle) = pinger {
        handle.stop().await;
    }

    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_rust_log_can_raise_or_lower_the_level() {
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
    }
}
