mod cli;

use crate::cli::settings::Settings;
use crate::cli::{Cli, Command, commands};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tallystore::{
    AutoSaveCounter, Connectivity, FileCache, HttpRemote, InMemoryRemote, MutationKind, RemoteApi,
    spawn_connectivity_probe,
};
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const PROBE_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env()
        .context("failed to load configuration")?
        .with_overrides(cli.data_dir.clone(), cli.remote_url.clone(), cli.offline);
    let config = settings.store_config();

    let http_remote: Option<Arc<dyn RemoteApi>> = match settings.remote_url.as_deref() {
        Some(url) if !settings.offline => Some(Arc::new(HttpRemote::new(url, config.bounds))),
        _ => None,
    };

    if let Command::Health = cli.command {
        return commands::health(http_remote, settings.remote_timeout).await;
    }

    let cache = Arc::new(
        FileCache::open(&settings.data_dir).with_context(|| {
            format!("failed to open data directory '{}'", settings.data_dir.display())
        })?,
    );

    let connectivity = Connectivity::offline();
    let (remote, probe) = match http_remote {
        Some(remote) => {
            let reachable = matches!(
                timeout(settings.remote_timeout, remote.health()).await,
                Ok(Ok(()))
            );
            if !reachable {
                warn!(url = ?settings.remote_url, "remote unreachable, working offline");
            }
            connectivity.set_online(reachable);
            let probe = spawn_connectivity_probe(
                Arc::clone(&remote),
                connectivity.clone(),
                PROBE_INTERVAL,
                settings.remote_timeout,
            );
            (remote, Some(probe))
        }
        None => {
            info!("no remote configured, using local cache only");
            let remote: Arc<dyn RemoteApi> = Arc::new(InMemoryRemote::new(config.bounds));
            (remote, None)
        }
    };

    let counter = AutoSaveCounter::open(config, remote, cache, connectivity)
        .await
        .context("failed to open counter")?;

    let result = match cli.command {
        Command::Show => commands::show(&counter),
        Command::Inc { times } => commands::mutate(&counter, MutationKind::Increment, times).await,
        Command::Dec { times } => commands::mutate(&counter, MutationKind::Decrement, times).await,
        Command::Reset => commands::mutate(&counter, MutationKind::Reset, 1).await,
        Command::Session => commands::session(&counter),
        Command::Export { out } => commands::export(&counter, out),
        Command::Import { file } => commands::import(&counter, &file).await,
        Command::Sync => commands::sync(&counter).await,
        Command::Health => Ok(()),
    };

    counter.close().await.context("failed to close counter")?;
    if let Some(probe) = probe {
        probe.stop().await;
    }
    result
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tally=info,tallystore=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
