use agent_tree_server::server::{
    config::{CliArgs, ServerConfig},
    db::Database,
    repository::SqlAgentRepository,
    serve::serve_with_incoming,
    service::{
        agent::AgentTreeService, endpoint::ChildAgentIdsEndpoint, middleware::LoggingMiddleware,
    },
    telemetry::init_telemetry,
};
use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry(config.log_format)?;
    tracing::info!("Starting agent tree service");

    let res = run(config).await;
    match &res {
        Ok(()) => tracing::info!("Agent tree service stopped"),
        Err(e) => tracing::error!("Agent tree service failed: {:#}", e),
    }

    providers.shutdown();
    res
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let db = Database::from_config(&config)
        .await
        .context("failed to connect to the agent database")?;

    let endpoint = LoggingMiddleware::new(ChildAgentIdsEndpoint::new(AgentTreeService::new(
        SqlAgentRepository::new(db.clone()),
    )));

    let tcp = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    log_startup_info(&config);

    let res = serve_with_incoming(
        endpoint,
        TcpListenerStream::new(tcp),
        config.request_timeout,
        shutdown_signal(),
    )
    .await;

    db.close().await;
    res
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Listening on {} with full config: {:#?}",
            config.server_addr,
            redacted(config)
        );
    } else {
        tracing::info!(
            "Listening on {} with up to {} database connections",
            config.server_addr,
            config.max_connections
        );
    }
}

// The connection string may carry credentials.
fn redacted(config: &ServerConfig) -> ServerConfig {
    let mut config = config.clone();
    if let Some((scheme, _)) = config.database_url.split_once("://") {
        config.database_url = format!("{scheme}://<redacted>");
    }
    config
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
