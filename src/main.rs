use anyhow::{Context, Result};
use clap::Parser;
use githarvest::config::Settings;
use githarvest::github::{CommitSource, GithubClient};
use githarvest::poller::{self, HarvesterDeps};
use githarvest::storage;
use githarvest::watermark::ConsulKv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::parse();
    settings.validate().context("Invalid configuration")?;

    let source: Arc<dyn CommitSource> = Arc::new(
        GithubClient::with_base_url(
            &settings.github_api_url,
            &settings.organization,
            settings.github_token.clone(),
        )
        .context("Failed to construct GitHub client")?,
    );
    let watermarks =
        Arc::new(ConsulKv::new(&settings.consul_addr).context("Failed to construct Consul client")?);
    let logs = storage::make_store(settings.storage_type, &settings.storage_root)
        .context("Failed to construct log storage")?;

    let deps = HarvesterDeps {
        source: Arc::clone(&source),
        watermarks,
        logs,
    };

    // Startup is fatal if the organization cannot be listed at all
    let repos = source
        .list_repositories()
        .await
        .context("Failed to list repositories")?;
    tracing::info!(
        "Found {} repositories in '{}'",
        repos.len(),
        settings.organization
    );

    let cancel = CancellationToken::new();
    let handles: Vec<_> = repos
        .into_iter()
        .map(|repo| poller::spawn_repo_task(deps.clone(), repo, cancel.clone()))
        .collect();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    tracing::info!("Interrupt received, cancelling outstanding poll tasks");
    cancel.cancel();

    futures::future::join_all(handles).await;

    Ok(())
}
