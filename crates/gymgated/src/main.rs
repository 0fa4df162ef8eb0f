use anyhow::Result;
use gymgate_core::ApiClient;
use gymgate_hw::V4lCapture;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod poller;
mod registration;
mod router;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the console screens.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("gymgated starting");

    let config = config::Config::from_env();
    let api = Arc::new(ApiClient::new(&config.api_url, config.request_timeout())?);
    if api.health().await {
        tracing::info!(url = %config.api_url, "API reachable");
    } else {
        tracing::warn!(url = %config.api_url, "API not reachable; screens will show errors until it is");
    }

    let camera = Arc::new(V4lCapture::new(config.capture_settings()));
    tracing::info!(device = %config.camera_device, "camera configured");

    let mut router =
        router::ViewRouter::new(api, camera, config.poller_config(), config.initial_view);
    router.activate();

    console::run(router).await?;

    tracing::info!("gymgated shutting down");
    Ok(())
}
