use anyhow::Result;
use facegated::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    tracing::info!(
        bind = %config.bind,
        store = ?config.store,
        model_dir = %config.model_dir.display(),
        "facegated starting"
    );

    facegated::run(config).await
}
