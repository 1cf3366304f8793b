use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod discovery;
mod ledger;
mod mirror;
mod reference;
mod sources;
mod transport;

use config::{env_var_non_empty, MirrorConfig};
use discovery::HubClient;
use mirror::Orchestrator;
use transport::DockerCli;

/// Mirror container images from Docker Hub to a private registry.
///
/// Sources are either repository URLs (their most recent tags are
/// discovered automatically) or a file of explicit image expressions.
/// Already-mirrored tags are tracked in an append-only ledger so repeated
/// runs only transfer what is new.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Target registry hostname (fallback: TARGET_REGISTRY)
    #[arg(long)]
    registry: Option<String>,

    /// Namespace on the target registry (fallback: TARGET_NAMESPACE)
    #[arg(long)]
    namespace: Option<String>,

    /// Target registry username (fallback: REGISTRY_USERNAME)
    #[arg(long)]
    username: Option<String>,

    /// Target registry password (fallback: REGISTRY_PASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// Path of the append-only transfer ledger
    #[arg(long, default_value = config::DEFAULT_LEDGER_PATH)]
    ledger: std::path::PathBuf,

    /// Number of recent tags to fetch per repository URL
    #[arg(long, default_value_t = config::DEFAULT_TAGS_PER_REPO)]
    tags_per_repo: usize,

    /// Comma-separated repository URLs, e.g. https://hub.docker.com/_/nginx
    /// (fallback: SOURCE_URLS)
    #[arg(long)]
    source_urls: Option<String>,

    /// File of image expressions, one per line; `#` starts a comment and a
    /// `--platform=<p>` token selects a platform
    #[arg(long)]
    images_file: Option<std::path::PathBuf>,

    /// Container CLI to invoke (docker or podman)
    #[arg(long, default_value = config::DEFAULT_CONTAINER_CLI)]
    container_cli: String,

    /// Skip the registry login step and rely on existing credentials
    #[arg(long)]
    skip_login: bool,
}

impl Cli {
    fn into_config(self) -> MirrorConfig {
        MirrorConfig {
            target_registry: self
                .registry
                .or_else(|| env_var_non_empty("TARGET_REGISTRY"))
                .unwrap_or_default(),
            target_namespace: self
                .namespace
                .or_else(|| env_var_non_empty("TARGET_NAMESPACE"))
                .unwrap_or_default(),
            username: self
                .username
                .or_else(|| env_var_non_empty("REGISTRY_USERNAME")),
            password: self
                .password
                .or_else(|| env_var_non_empty("REGISTRY_PASSWORD")),
            ledger_path: self.ledger,
            tags_per_repo: self.tags_per_repo,
            container_cli: self.container_cli,
            skip_login: self.skip_login,
            source_urls: self.source_urls.or_else(|| env_var_non_empty("SOURCE_URLS")),
            images_file: self.images_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config();
    config.validate()?;

    if config.skip_login {
        info!("Skipping registry login, relying on existing credentials");
    } else {
        // Presence of credentials was validated above; a rejected login is
        // fatal before any transfer starts
        transport::registry_login(
            &config.container_cli,
            &config.target_registry,
            config.username.as_deref().unwrap_or_default(),
            config.password.as_deref().unwrap_or_default(),
        )?;
    }

    let mut all_sources = Vec::new();
    if let Some(urls) = &config.source_urls {
        all_sources.extend(sources::parse_source_urls(urls));
    }
    if let Some(path) = &config.images_file {
        all_sources.extend(sources::read_source_file(path)?);
    }
    if all_sources.is_empty() {
        warn!("All configured sources were empty or unparseable; nothing to do");
        return Ok(());
    }
    info!("Mirroring {} configured source(s)", all_sources.len());

    let transport = DockerCli::new(&config.container_cli);
    let discovery = HubClient::new(discovery::DEFAULT_HUB_URL);
    let orchestrator = Orchestrator::new(&config, &transport, &discovery);
    orchestrator.run(&all_sources).await?;

    Ok(())
}
