use device_grant_broker::AppResources;
use device_grant_broker::api::start_webserver;
use device_grant_broker::cleanup::spawn_cleanup_task;
use device_grant_broker::config::load_config_or_panic;
use device_grant_broker::grant::GrantState;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "device_grant_broker=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    // A missing .env is fine; real deployments use the environment directly.
    let _ = dotenvy::dotenv();

    initialize_standard_tracing();

    let config = Arc::new(load_config_or_panic());
    let db = Arc::new(Database::connect(&config.database_url).await?);
    let resources = AppResources { db, config };

    tracing::info!(
        clients = resources.config.clients.len(),
        polling_interval = resources.config.device_grant.polling_interval,
        code_expiration = resources.config.device_grant.code_expiration,
        verification_uri = %resources.config.verification_uri(),
        "device grant configuration"
    );

    let state = GrantState::new(resources.db.clone(), &resources.config)?;
    spawn_cleanup_task(state.store.clone(), resources.config.cleanup.clone());

    start_webserver(state, &resources.config.listen_addr).await?;
    Ok(())
}
