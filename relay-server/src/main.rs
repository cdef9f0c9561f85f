mod config;
mod connection;
mod error;
mod http;
mod manager;
mod room;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::connection::websocket_handler;
use crate::http::{health_handler, rooms_handler, stats_handler};
use crate::manager::RoomManager;

#[tokio::main]
/// Loads configuration, seeds the room floor, spawns the cleanup
/// watchdog, then serves the WebSocket and HTTP surface until `SIGINT`
/// or `SIGTERM`.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let manager = Arc::new(RoomManager::new(config));
    manager.ensure_min_rooms().await;

    let cleanup_manager = manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(manager::CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            cleanup_manager.cleanup().await;
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/rooms", get(rooms_handler))
        .route("/ws", get(websocket_handler))
        .fallback(websocket_handler)
        .layer(cors)
        .with_state(manager.clone());

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(source) => {
            let err = error::ServerError::BindFailed { port: config.port, source };
            tracing::error!(error = %err, "failed to start");
            std::process::exit(1);
        }
    };

    tracing::info!(port = config.port, "relay server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .expect("server loop failed");
}

/// Waits for `SIGINT` or `SIGTERM`, then drains every room so their tick
/// tasks stop cleanly before the process exits.
async fn shutdown_signal(manager: Arc<RoomManager>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping rooms");
    manager.shutdown().await;
}
