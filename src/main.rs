//! bribe-reconcile - run one batch job and print the JSON report
//!
//! Usage: `bribe-reconcile <job.json>`
//!
//! Environment:
//! - `REWARD_ENGINE_CONFIG`: optional TOML config layered over the defaults
//! - `STATE_FIXTURE`: replay against a JSON state fixture instead of RPC
//! - `TOKEN_CACHE`: optional JSON token metadata cache, updated after the run
//! - `RPC_URL`, `RPC_FALLBACK_URL`, `RPC_TIMEOUT_SECS`, `RPC_MAX_RETRIES`

use eyre::{eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ve_bribe_engine::utils::constants::{APP_NAME, APP_VERSION};
use ve_bribe_engine::{
    BatchJob, BatchReport, BatchRunner, ChainStateReader, EngineConfig, FixtureStateReader, InMemoryTokenStore,
    RpcConfig, RpcStateReader,
};

async fn run_batch<R: ChainStateReader>(
    reader: Arc<R>,
    store: Arc<InMemoryTokenStore>,
    config: Arc<EngineConfig>,
    job: &BatchJob,
) -> Result<BatchReport> {
    let runner = BatchRunner::new(reader, store, config)?;
    Ok(runner.run(job).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("🚀 {} v{}", APP_NAME, APP_VERSION);

    let job_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| eyre!("usage: bribe-reconcile <job.json>"))?;
    let job = BatchJob::from_file(&job_path)?;

    let config = match std::env::var("REWARD_ENGINE_CONFIG") {
        Ok(path) if !path.trim().is_empty() => EngineConfig::from_file(path)?,
        _ => EngineConfig::default(),
    };
    let config = Arc::new(config);

    let cache_path = std::env::var("TOKEN_CACHE").ok().filter(|p| !p.trim().is_empty());
    let store = match cache_path.as_deref() {
        Some(path) if std::path::Path::new(path).exists() => InMemoryTokenStore::from_file(path)?,
        _ => InMemoryTokenStore::new(),
    };
    let store = Arc::new(store);

    let report = match std::env::var("STATE_FIXTURE") {
        Ok(path) if !path.trim().is_empty() => {
            info!("📦 Offline replay from {}", path);
            let reader = Arc::new(FixtureStateReader::from_file(&path)?);
            run_batch(reader, store.clone(), config, &job).await?
        }
        _ => {
            let rpc = RpcConfig::from_env()?;
            let reader = Arc::new(RpcStateReader::from_config(&rpc)?);
            run_batch(reader, store.clone(), config, &job).await?
        }
    };

    if let Some(path) = cache_path {
        std::fs::write(&path, store.to_json()?)?;
        info!("💾 Token cache written to {}", path);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
