use constellation_engine::features::observability::controller::metrics_router;
use constellation_engine::server::AdminProcessServer;
use constellation_engine::shared::config::EngineConfig;
use constellation_engine::Constellation;
use constellation_proto::v1::admin_process_service_server::AdminProcessServiceServer;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// The filter alone decides verbosity, so `RUST_LOG=debug` reaches debug events.
fn build_subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    FmtSubscriber::builder().with_env_filter(filter).finish()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("constellation_engine=info,info"));
    tracing::subscriber::set_global_default(build_subscriber(filter))?;

    let config = EngineConfig::from_env()?;
    info!(
        config_dir = %config.config_dir.display(),
        admin_addr = %config.admin_addr,
        services = ?config.services,
        "Starting Constellation"
    );

    let engine = Arc::new(Constellation::new(config.clone())?);
    let boot = engine.start().await?;
    for (service, started) in &boot.workers {
        info!(%service, started = started.len(), "Service instances up");
    }

    if let Some(metrics_addr) = config.metrics_addr {
        let router = metrics_router(engine.metrics().clone());
        let listener = tokio::net::TcpListener::bind(metrics_addr).await?;
        info!(%metrics_addr, "Serving metrics");
        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router).await {
                warn!(error = %error, "Metrics endpoint stopped");
            }
        });
    }

    let server = AdminProcessServer::new(Arc::new(engine.process_controller()));
    info!(admin_addr = %config.admin_addr, "Constellation initialized successfully");

    Server::builder()
        .add_service(AdminProcessServiceServer::new(server))
        .serve_with_shutdown(config.admin_addr, async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(error = %error, "Cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Shutting down");
    engine.shutdown().await?;
    Ok(())
}
