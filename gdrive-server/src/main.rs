use anyhow::Result;
use gdrive_server::{ConfigMap, ServerSettings};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = ServerSettings::from_config(&ConfigMap::from_env())?;
    let ax = gdrive_server::build(&settings).await;

    let addr = settings.addr();
    info!("[gdrive] listening on http://{addr}");

    ax.listen_with_shutdown(addr, shutdown_signal()).await?;

    info!("[gdrive] stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
