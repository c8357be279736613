//! # cairn
//!
//! Command-line host for one Cairn storage engine.
//!
//! Configuration comes from the `CAIRN_*` environment variables, with the
//! global flags layered on top. There is no transport behind this binary:
//! the engine gets a log-only network collaborator, so add and delete
//! broadcasts show up in the log and no remote peer is ever reachable.

mod cli;
mod commands;

use std::sync::Arc;

use cairn_engine::{EngineConfig, LogOnlyNetwork, StorageEngine};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var). Logs go to stderr so
    //    stdout stays clean for command output.
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cairn_engine=info,cairn_node=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let mut config = EngineConfig::from_env();
    cli.global.apply(&mut config);
    debug!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the engine (runs one recovery sweep)
    // -----------------------------------------------------------------------
    let mut engine = StorageEngine::open(config, Arc::new(LogOnlyNetwork)).await?;
    info!(
        "Cairn v{} ready as {}",
        env!("CARGO_PKG_VERSION"),
        engine.local_peer_id()
    );

    // -----------------------------------------------------------------------
    // 4. Dispatch
    // -----------------------------------------------------------------------
    match cli.command {
        Command::Add {
            path,
            name,
            mime,
            indexed,
            passphrase,
        } => commands::add(&mut engine, &path, name, mime, indexed, passphrase).await,
        Command::Get {
            content_id,
            out,
            passphrase,
        } => commands::get(&mut engine, &content_id, out.as_deref(), passphrase.as_deref()).await,
        Command::Ls => commands::list(&engine),
        Command::Search { query } => commands::search(&engine, &query),
        Command::Rm { content_id } => commands::remove(&mut engine, &content_id).await,
        Command::Quota => commands::quota(&engine),
        Command::SetCapacity { gb } => commands::set_capacity(&mut engine, gb).await,
        Command::SetIndexed { content_id, indexed } => {
            commands::set_indexed(&mut engine, &content_id, indexed).await
        }
        Command::Verify => commands::verify(&mut engine).await,
        Command::Stats => commands::stats(&engine),
        Command::Serve => commands::serve(&engine).await,
    }
}
