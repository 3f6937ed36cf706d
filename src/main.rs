//! ARBAAK — Hong Kong racing odds and discount board
//!
//! Entry point. Loads configuration, initialises structured logging,
//! runs one fetch cycle for today's Hong Kong date and prints the board.

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use arbaak::config;
use arbaak::engine::aggregator::Aggregator;
use arbaak::types::hong_kong_offset;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = config::AppConfig::default_path();
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    // Racing days follow the Hong Kong calendar regardless of host timezone.
    let today = Utc::now().with_timezone(&hong_kong_offset()).date_naive();
    info!(
        name = %cfg.app.name,
        config = %config_path,
        source = ?cfg.app.source,
        venue = ?cfg.app.venue,
        %today,
        "ARBAAK starting up"
    );

    let mut aggregator = Aggregator::new(&cfg)?;
    match aggregator.build_board(today).await? {
        Some(board) => println!("{board}"),
        None => println!("No upcoming race today"),
    }

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbaak=info"));

    let json_logging = std::env::var("ARBAAK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
