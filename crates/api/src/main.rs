//! Growth Academy API server

use growth_api::{routes, AppState, Config};
use growth_billing::{StripeClient, StripeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let stripe_config = StripeConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;

    let pool = growth_shared::create_pool(
        &config.database_url,
        config.database_max_connections,
    )
    .await?;
    growth_shared::run_migrations(&pool).await?;

    let stripe = StripeClient::new(stripe_config);
    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, pool, stripe).map_err(|e| anyhow::anyhow!("{}", e))?;

    // Hourly sweep of idle contact-form limiter windows
    let limiter = state.contact_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            limiter.cleanup(60 * 60 * 1000).await;
        }
    });

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Growth Academy API listening");

    axum::serve(listener, app).await?;

    Ok(())
}
