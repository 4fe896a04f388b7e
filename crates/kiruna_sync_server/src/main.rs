use kiruna_core::{ConfigStore, JsonFileStore};
use kiruna_sync_server::{build_router, config::Config, sync::SyncHub};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiruna_sync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Kiruna Sync Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Graph configuration: {:?}", config.graph_config_path);
    info!("CORS origins: {:?}", config.cors_origins);

    // Open the store, creating the document if this is the first run
    let store: Arc<dyn ConfigStore> =
        Arc::new(JsonFileStore::new(config.graph_config_path.clone()));
    match store.load() {
        Ok(graph) => info!("Loaded {} positioned elements", graph.len()),
        Err(e) => {
            error!("Failed to open graph configuration: {}", e);
            std::process::exit(1);
        }
    }

    let (hub, hub_task) = SyncHub::new(store).spawn();
    let app = build_router(hub.clone(), &config);

    // Create listener
    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    // Run server with graceful shutdown
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    hub.shutdown();
    let _ = hub_task.await;

    info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
