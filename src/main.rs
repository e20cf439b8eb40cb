//! Ledger server: Maya webhook receiver and donor redirect endpoints.

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campaign_ledger::{http, FundingPlatform, LedgerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // optional .env file
    let _ = dotenvy::dotenv();

    let config = LedgerConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    let api_port: u16 = std::env::var("API_PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid API_PORT"))?;

    let platform = FundingPlatform::with_maya(config).map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        currency = %platform.config().currency,
        gateway = %platform.config().gateway.base_url,
        "ledger initialised"
    );

    let app = http::router(Arc::new(platform)).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{api_port}");
    info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
