//! One handler per subcommand. Each takes an opened engine and prints its
//! result as JSON on stdout.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use cairn_engine::{IngestRequest, StorageEngine};
use cairn_shared::{ContentId, FileMetadata};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// How often `serve` re-reads the collaborator's peer list.
const PEER_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub async fn add(
    engine: &mut StorageEngine,
    path: &Path,
    name: Option<String>,
    mime: String,
    indexed: bool,
    passphrase: Option<String>,
) -> anyhow::Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?,
    };

    let mut request = IngestRequest::new(name, data).mime_type(mime).indexed(indexed);
    if let Some(passphrase) = passphrase {
        request = request.passphrase(passphrase);
    }

    let outcome = engine.add_file(request).await?;
    #[derive(Serialize)]
    struct Added<'a> {
        content_id: &'a ContentId,
        deduplicated: bool,
        passphrase_ignored: bool,
        tiers: Vec<String>,
    }
    print_json(&Added {
        content_id: &outcome.metadata.content_id,
        deduplicated: outcome.deduplicated,
        passphrase_ignored: outcome.passphrase_ignored,
        tiers: outcome.tiers.tiers().iter().map(ToString::to_string).collect(),
    })
}

pub async fn get(
    engine: &mut StorageEngine,
    content_id: &str,
    out: Option<&Path>,
    passphrase: Option<&str>,
) -> anyhow::Result<()> {
    let id = parse_id(content_id)?;
    let data = engine.get_file(&id, passphrase).await?;

    match out {
        Some(path) => {
            tokio::fs::write(path, &data)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(content_id = %id, path = %path.display(), size = data.len(), "file written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

pub fn list(engine: &StorageEngine) -> anyhow::Result<()> {
    print_json(&sorted(engine.get_file_index()))
}

pub fn search(engine: &StorageEngine, query: &str) -> anyhow::Result<()> {
    print_json(&sorted(engine.search_files(query)))
}

pub async fn remove(engine: &mut StorageEngine, content_id: &str) -> anyhow::Result<()> {
    let id = parse_id(content_id)?;
    let removed = engine.delete_file(&id).await?;
    print_json(&removed)
}

pub fn quota(engine: &StorageEngine) -> anyhow::Result<()> {
    print_json(&engine.quota())
}

pub async fn set_capacity(engine: &mut StorageEngine, gb: f64) -> anyhow::Result<()> {
    let quota = engine.set_capacity(gb).await?;
    print_json(&quota)
}

pub async fn set_indexed(engine: &mut StorageEngine, content_id: &str, indexed: bool) -> anyhow::Result<()> {
    let id = parse_id(content_id)?;
    let meta = engine.set_indexed(&id, indexed).await?;
    print_json(&meta)
}

pub async fn verify(engine: &mut StorageEngine) -> anyhow::Result<()> {
    let report = engine.validate().await;
    print_json(&report)
}

pub fn stats(engine: &StorageEngine) -> anyhow::Result<()> {
    print_json(&engine.stats())
}

/// Track peer liveness until Ctrl+C.
pub async fn serve(engine: &StorageEngine) -> anyhow::Result<()> {
    serve_until(engine, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler failed, shutting down");
        }
    })
    .await
}

/// Run the heartbeat monitor and the peer refresh until `shutdown`
/// resolves. The shutdown future lives across loop iterations, so a signal
/// that lands during a refresh is seen on the next pass.
async fn serve_until(engine: &StorageEngine, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let monitor = engine.spawn_heartbeat();
    info!(peer = %engine.local_peer_id(), "serving, press Ctrl+C to stop");

    let mut refresh = tokio::time::interval(PEER_REFRESH_INTERVAL);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                engine.refresh_peers().await;
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    monitor.shutdown().await;
    print_json(&engine.stats())
}

fn parse_id(raw: &str) -> anyhow::Result<ContentId> {
    match raw.parse::<ContentId>() {
        Ok(id) => Ok(id),
        Err(e) => bail!("invalid content id {raw:?}: {e}"),
    }
}

fn sorted(mut files: Vec<FileMetadata>) -> Vec<FileMetadata> {
    files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.content_id.cmp(&b.content_id)));
    files
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
