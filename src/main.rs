use std::sync::Arc;

use tracing::info;

use threatwire::notify::{start_notify_loops, HttpEmailTransport};
use threatwire::rate_limit::{LimiterConfig, SubmissionGuard};
use threatwire::web::{build_router, AppState};
use threatwire::{Config, Database, EmailTransport, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = threatwire::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        threatwire::logging::init_console_only(&config.logging.level);
    }

    info!("threatwire - threat-intelligence notification service");

    let db = Database::open(&config.database.path).await?;
    let transport: Arc<dyn EmailTransport> = Arc::new(HttpEmailTransport::new(&config.email)?);

    // Background pipeline: ingestion plus digest/critical dispatch loops
    threatwire::feed::start_ingest_loop(db.clone(), &config.ingest)?;
    start_notify_loops(
        db.clone(),
        Arc::clone(&transport),
        config.server.clone(),
        config.notify.clone(),
    );

    let guard = SubmissionGuard::new(
        LimiterConfig::new(config.rate_limit.address_max, config.rate_limit.window_secs),
        LimiterConfig::new(config.rate_limit.origin_max, config.rate_limit.window_secs),
    );

    let state = Arc::new(AppState {
        db,
        transport,
        guard,
        config: config.clone(),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| threatwire::ThreatwireError::Io(e))?;

    Ok(())
}
