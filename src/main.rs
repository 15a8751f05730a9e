use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use banana_ripeness::{
    model::RoboflowClassifier,
    router,
    storage::DetectionStore,
    upload::{ensure_upload_dir, UploadDir},
    AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;

    ensure_upload_dir(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    let store = DetectionStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    if let Err(err) = store.init_schema().await {
        error!("Database initialization error: {err}");
    }

    let classifier =
        RoboflowClassifier::new(&config.classifier).context("failed to build classifier client")?;
    info!("Using hosted model {}", classifier.model_id());

    let shared_state = Arc::new(AppState {
        store,
        classifier: Arc::new(classifier),
        uploads: UploadDir::new(&config.upload_dir, config.allowed_extensions.clone()),
    });

    let app = router(shared_state, config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
