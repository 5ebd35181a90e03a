//! Manager executable: serves one request queue against one store.
//!
//! ```bash
//! # Serve the "kfc:req" queue against a local Redis
//! kfchess kfc:req kfc:cnf 127.0.0.1 6379
//!
//! # More worker tasks
//! kfchess kfc:req kfc:cnf 127.0.0.1 6379 --workers 8
//! ```
//!
//! The process exits 0 after a clean `exit-req` shutdown and non-zero on
//! unrecoverable setup failure.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use kfchess::manager::GameManager;
use kfchess::store::RedisStore;

/// Kung-Fu Chess game manager — serves a request queue of game commands.
#[derive(Parser, Debug)]
#[command(name = "kfchess")]
#[command(about = "Kung-Fu Chess game manager — real-time chess with per-piece cooldowns")]
#[command(version)]
struct Cli {
    /// Store key of the request queue to pop commands from.
    request_queue: String,

    /// Store key of the response queue to push confirmations to.
    response_queue: String,

    /// Key-value store host.
    store_host: String,

    /// Key-value store port.
    store_port: u16,

    /// Number of worker tasks. Commands for one game always share a
    /// worker, so this bounds cross-game parallelism only.
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let store = match RedisStore::connect(&cli.store_host, cli.store_port).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("cannot reach store at {}:{}: {e}", cli.store_host, cli.store_port);
            return ExitCode::FAILURE;
        }
    };

    let manager = GameManager::new(
        store,
        cli.request_queue.as_str(),
        cli.response_queue.as_str(),
        cli.workers,
    );
    log::info!("store: {}:{}", cli.store_host, cli.store_port);
    log::info!("request queue: {}", cli.request_queue);
    log::info!("response queue: {}", cli.response_queue);
    log::info!("key base: {}", manager.key_base());

    match manager.run().await {
        Ok(()) => {
            log::info!("manager shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("manager loop failed: {e}");
            ExitCode::FAILURE
        }
    }
}
