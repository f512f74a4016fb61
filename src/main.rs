use anyhow::Context;
use deadpool_engine::engine::{Clock, SystemClock};
use deadpool_engine::external::{
    BeaconRandomness, HttpGateway, LocalRandomness, RandomnessSource,
};
use deadpool_engine::{
    api, config::Config, db::init_db, Collaborators, LifecycleController, Registry, Repository,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry = Arc::new(
        Registry::configure(
            repo.clone(),
            clock.clone(),
            config.admin.clone(),
            config.treasury.clone(),
            config.exchange.clone(),
            config.initial_fee_bps,
        )
        .await
        .context("failed to configure registry")?,
    );

    let gateway = Arc::new(HttpGateway::new(config.gateway_url.clone()));
    let randomness: Arc<dyn RandomnessSource> = match &config.randomness_beacon_url {
        Some(url) => Arc::new(BeaconRandomness::new(url.clone())),
        None => {
            tracing::warn!("RANDOMNESS_BEACON_URL not set, drawing winners from local entropy");
            Arc::new(LocalRandomness)
        }
    };
    let collaborators = Collaborators {
        exchange: gateway.clone(),
        payouts: gateway.clone(),
        custody: gateway,
        randomness,
    };

    let lifecycle = Arc::new(LifecycleController::new(
        repo.clone(),
        registry,
        collaborators,
        clock,
        config.pool_policy(),
    ));

    let app = api::create_router(api::AppState::new(repo, lifecycle));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
