//! Matchpit: tournament orchestration for remote game servers.
//!
//! Loads configuration, seeds the server pool, wires the allocation engine
//! and event reconciler over the in-memory store, and serves the admin API
//! plus the webhook listener until a shutdown signal arrives.

use matchpit_core::{
    AllocationEngine, EventReconciler, MemoryStore, Repository, ServerCommander, ServerRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commander;
mod config;
mod rating;
mod routes;
mod signals;

use cli::CliArgs;
use config::AppConfig;

/// How often the background probe refreshes observed server liveness.
const PROBE_INTERVAL: Duration = Duration::from_secs(60);

fn setup_logging(config: &config::LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(fmt::layer().json().with_file(false).with_line_number(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_file(false).with_line_number(false))
            .init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", args.config_path.display()))?;

    if let Some(bind) = args.bind_address {
        config.http.bind_address = bind;
    }
    if let Some(url) = args.public_url {
        config.http.public_base_url = url;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration invalid: {e}"))?;

    setup_logging(&config.logging);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config_path.display(),
        "matchpit starting"
    );

    let repo: Arc<dyn Repository> = Arc::new(MemoryStore::new());
    for server in config.game_servers() {
        info!(name = %server.name, addr = %server.addr(), enabled = server.enabled, "server configured");
        repo.put_server(server).await;
    }

    let rcon: Arc<dyn ServerCommander> = Arc::new(commander::RconCommander);
    let registry = Arc::new(ServerRegistry::new(Arc::clone(&repo), Arc::clone(&rcon)));
    let engine = Arc::new(AllocationEngine::new(
        Arc::clone(&repo),
        Arc::clone(&registry),
        Arc::clone(&rcon),
        config.engine_config(),
    ));
    let reconciler = Arc::new(EventReconciler::new(
        Arc::clone(&repo),
        Arc::new(rating::LogRatingSink),
    ));

    // Initial probe so the first admin query shows real liveness, then a
    // periodic refresh in the background.
    registry.probe_all().await;
    let probe_handle = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROBE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                registry.probe_all().await;
            }
        })
    };

    let state = routes::AppState {
        repo,
        engine,
        reconciler,
        registry,
        webhook_header: Arc::from(config.orchestration.webhook_header.as_str()),
        webhook_secret: Arc::from(config.orchestration.webhook_secret.as_str()),
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.http.bind_address).await?;
    info!(
        bind = %config.http.bind_address,
        public = %config.http.public_base_url,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signals::wait_for_shutdown().await {
                error!(error = %e, "signal handler failed");
            }
        })
        .await?;

    probe_handle.abort();
    info!("shutdown complete");
    Ok(())
}
