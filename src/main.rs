use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use diesel_migrations::MigrationHarness;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use pengajuan::auth::jwt::JwtService;
use pengajuan::config::AppConfig;
use pengajuan::db;
use pengajuan::routes;
use pengajuan::state::AppState;
use pengajuan::workflow::CachedCatalog;
use pengajuan::MIGRATIONS;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        requirement_cache_ttl_secs = config.requirement_cache_ttl.as_secs(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;

    {
        let mut conn = pool.get().context("failed to get migration connection")?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        tracing::info!(applied = applied.len(), "database migrations up to date");
    }

    let catalog = Arc::new(CachedCatalog::new(config.requirement_cache_ttl));
    let jwt = JwtService::from_config(&config)?;
    let state = AppState::new(pool, config, catalog, jwt);

    let listen_addr: SocketAddr = {
        let config = state.config.clone();
        format!("{}:{}", config.server_host, config.server_port).parse()?
    };
    let router = routes::create_router(state)?;

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
