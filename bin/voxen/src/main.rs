use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voxen_net::{build_server, Config};

const DEFAULT_LOG_FILTER: &str = "info,voxen=debug,voxen_net=debug,voxen_service=debug,voxen_chain=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;
    info!(db = %config.db_path.display(), "starting voxen");

    build_server(config).await?;
    Ok(())
}
