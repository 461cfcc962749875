use pizza_server::AppResources;
use pizza_server::api::start_webserver;
use pizza_server::config::load_config_or_panic;
use pizza_server::oauth2::OAuth2State;
use pizza_server::store::DatabaseStore;
use sea_orm::Database;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "pizza_server=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    // Set up SeaORM database connection
    let db = Arc::new(Database::connect(&config.database_url).await?);

    let store = Arc::new(DatabaseStore::new(db.clone()));
    let oauth2_state = OAuth2State::new(store, config.clone())?;
    let resources = AppResources { db, config };

    // Expired authorization codes are rejected on redemption anyway; this
    // only keeps the table small.
    {
        let codes = oauth2_state.codes.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(300)); // 5 minutes
            loop {
                interval.tick().await;
                match codes.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Purged expired authorization codes"),
                    Err(e) => tracing::error!(error = %e, "Failed to purge authorization codes"),
                }
            }
        });
    }

    start_webserver(resources, oauth2_state).await?;
    Ok(())
}
