use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toplist::{
    api, broadcast, clock::SystemClock, config::ServerConfig, presence::PresenceTracker, seed,
    state::AppState, store::MemoryStore, ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toplist=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting toplist...");

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::with_parts(
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        PresenceTracker::new(config.presence_timeout_chrono()),
    ));

    if let Some(path) = &config.categories_file {
        match seed::load_categories_file(state.store.as_ref(), path).await {
            Ok(n) => tracing::info!("Loaded {} categories from {}", n, path.display()),
            Err(e) => tracing::warn!("Could not load categories from {}: {}", path.display(), e),
        }
    }

    // Initialize a default game so the GM screen has something to open
    match state.create_game("Game night".to_string()).await {
        Ok(game) => tracing::info!(
            "Default game {} ready, join code {}",
            game.id,
            game.join_code
        ),
        Err(e) => tracing::error!("Failed to create default game: {}", e),
    }

    // Timeouts produce no client event, so something has to look for them
    broadcast::spawn_presence_sweeper(state.clone(), config.sweep_interval);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::routes())
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on http://{}", config.bind);

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
