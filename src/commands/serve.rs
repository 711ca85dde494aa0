use anyhow::{Context, Result};

use rendergate::config::Config;
use rendergate::server::{build_dispatcher, shutdown_signal, GatewayServer};

/// Run the HTTP gateway until SIGINT/SIGTERM
pub async fn serve(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    if let Err(e) = rendergate::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let dispatcher = build_dispatcher(&config).await;

    // Launch eagerly so the first crawler does not pay for browser startup
    if let Err(e) = dispatcher.renderer().open().await {
        tracing::warn!(error = %e, "Browser launch failed, will retry on first render");
    }

    let server =
        GatewayServer::new(config, dispatcher).context("Failed to create gateway server")?;

    println!("{}", server.info().display());
    println!();
    println!("Endpoints:");
    println!("  GET  /health     - Health check");
    println!("  GET  /metrics    - Prometheus metrics endpoint");
    println!("  GET  /*          - Redirect humans, render for crawlers");
    println!();
    println!("Press Ctrl+C to stop.\n");

    server.start_with_shutdown(shutdown_signal()).await?;

    println!("Gateway stopped.");
    Ok(())
}
