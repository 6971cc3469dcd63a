use canteen_gate::{
    api,
    cache::{MealSlotCache, RedisStore},
    config::{
        self,
        database::{create_connection, create_tables, get_database_url},
    },
    core::{Clock, ConsumeEngine, SystemClock},
    errors::{Error, Result},
    jobs,
};
use chrono::Utc;
use dotenvy::dotenv;
use std::{future::IntoFuture, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also come from the environment
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the application configuration
    let app_config = Arc::new(config::load_default_config()?);
    info!("Successfully processed application configuration.");

    // 4. Refuse to start without a valid license
    jobs::validate_license(
        Path::new(&app_config.license.path),
        &app_config.license.public_key,
        Utc::now(),
    )
    .inspect_err(|e| error!("{}", e))?;

    // 5. Connect the database and ensure tables
    let database_url = get_database_url(app_config.database_url.as_deref());
    let db = create_connection(&database_url)
        .await
        .map(Arc::new)
        .inspect(|_| info!("Database connected."))
        .inspect_err(|e| error!("Failed to connect database: {}", e))?;
    create_tables(&db).await?;

    // 6. Connect the cache and warm today's window assignments
    let store = RedisStore::connect(&app_config.redis_url)
        .await
        .inspect_err(|e| error!("Failed to connect Redis: {}", e))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let slots = MealSlotCache::new(store.clone(), app_config.default_meal_id);
    let today = clock.now().date();
    if let Err(e) = jobs::refresh_meal_cache(&db, &slots, today).await {
        warn!("Startup meal cache refresh failed: {}", e);
    }
    match jobs::is_next_week_generated(&db, today).await {
        Ok(false) => warn!("Next week's meal slots have not been generated yet"),
        Ok(true) => {}
        Err(e) => warn!("Could not check next week's meal slots: {}", e),
    }

    // 7. Build the engine and bind the terminal API
    let engine = Arc::new(ConsumeEngine::new(
        Arc::clone(&db),
        store,
        Arc::clone(&clock),
        Arc::clone(&app_config),
    ));
    let listener = TcpListener::bind(&app_config.listen_addr)
        .await
        .inspect_err(|e| error!("Failed to bind {}: {}", app_config.listen_addr, e))?;
    info!("Listening on {}", app_config.listen_addr);

    // 8. Serve until shutdown; a fatal maintainer error stops the process
    let server = axum::serve(listener, api::router(engine))
        .with_graceful_shutdown(api::shutdown_signal())
        .into_future();
    tokio::select! {
        served = server => served.map_err(Error::from)?,
        maintained = jobs::run_maintainers(db, slots, clock, Arc::clone(&app_config)) => {
            maintained.inspect_err(|e| error!("Stopping: {}", e))?;
        }
    }

    info!("Shut down cleanly.");
    Ok(())
}
