mod constants;
mod routes;
mod seed;

use anyhow::Context;
use carbon_core::{
    constants::{
        DEFAULT_DIFFICULTY, DEFAULT_RETARGET_WINDOW, DEFAULT_TARGET_BLOCK_MILLIS,
        DEFAULT_TOKENS_PER_TON, GENESIS_TIMESTAMP, MAX_DIFFICULTY,
    },
    ChainConfig, ChainStore, DifficultyRule, MiningControl, SharedChain,
};
use carbon_storage::SledStore;
use clap::Parser;
use constants::DEFAULT_MINE_TIMEOUT_SECS;
use routes::{router, AppState};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Serves the blue carbon chain over HTTP")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Data directory for sled
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Leading zero hex digits required of each block
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Retarget the difficulty instead of keeping it fixed
    #[arg(long)]
    retarget: bool,

    /// Blocks between retargets
    #[arg(long, default_value_t = DEFAULT_RETARGET_WINDOW)]
    retarget_window: u64,

    #[arg(long, default_value_t = DEFAULT_TARGET_BLOCK_MILLIS)]
    target_block_millis: u64,

    /// BCT issued per tonne of CO₂ absorbed
    #[arg(long, default_value_t = DEFAULT_TOKENS_PER_TON)]
    tokens_per_ton: u64,

    #[arg(long, default_value_t = GENESIS_TIMESTAMP)]
    genesis_timestamp: u64,

    /// Seconds a single block may spend mining
    #[arg(long, default_value_t = DEFAULT_MINE_TIMEOUT_SECS)]
    mine_timeout_secs: u64,

    /// Register the sample projects on an empty chain
    #[arg(long)]
    seed: bool,

    /// Load this JSON snapshot into an empty data directory
    #[arg(long)]
    import: Option<PathBuf>,

    /// Write a JSON snapshot here on shutdown
    #[arg(long)]
    export: Option<PathBuf>,
}

impl Args {
    fn chain_config(&self) -> ChainConfig {
        let rule = if self.retarget {
            DifficultyRule::Retarget {
                initial: self.difficulty,
                min: 1,
                max: MAX_DIFFICULTY,
                window: self.retarget_window.max(1),
                target_block_millis: self.target_block_millis,
            }
        } else {
            DifficultyRule::fixed(self.difficulty)
        };
        ChainConfig::default()
            .with_difficulty(rule)
            .with_tokens_per_ton(self.tokens_per_ton)
            .with_genesis_timestamp(self.genesis_timestamp)
    }
}

fn open_chain(args: &Args, store: Arc<SledStore>, config: ChainConfig) -> anyhow::Result<SharedChain> {
    match &args.import {
        Some(path) if store.is_empty() => {
            let chain = SharedChain::load_snapshot(path, config)
                .with_context(|| format!("importing snapshot {}", path.display()))?;
            let written = chain.persist(store.as_ref())?;
            info!(blocks = written, path = %path.display(), "imported snapshot");
            Ok(chain.with_store(store))
        }
        Some(path) => {
            anyhow::bail!(
                "refusing to import {} into non-empty data dir {}",
                path.display(),
                args.data_dir.display()
            )
        }
        None => Ok(SharedChain::restore(store, config).context("restoring chain from store")?),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.chain_config();
    let store = Arc::new(SledStore::open(&args.data_dir)?);
    let chain = open_chain(&args, Arc::clone(&store), config)?;
    let mine_timeout = Duration::from_secs(args.mine_timeout_secs);

    if args.seed {
        let seeder = chain.clone();
        let added = tokio::task::spawn_blocking(move || {
            seed::seed(&seeder, &MiningControl::new().with_timeout(mine_timeout))
        })
        .await??;
        info!(projects = added, "seed complete");
    }

    let status = chain.status();
    info!(
        height = status.height,
        tip = %status.tip_hash,
        difficulty = status.next_difficulty,
        "chain ready"
    );

    let app = router(AppState {
        chain: chain.clone(),
        mine_timeout,
    });
    let addr: SocketAddr = args.listen.parse()?;
    info!("carbon-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(path) = &args.export {
        let blocks = chain.save_snapshot(path)?;
        info!(blocks, path = %path.display(), "exported snapshot");
    }
    store.close()?;
    Ok(())
}
