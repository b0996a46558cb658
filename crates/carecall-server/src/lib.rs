pub mod dispatch;
pub mod embed;
pub mod error;
pub mod observer;
pub mod persist;
pub mod routes;
pub mod runtime;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Queue
        .route("/api/queue/status", get(routes::queue::get_status))
        .route("/api/queue/records", get(routes::queue::get_records))
        .route("/api/queue/{command}", post(routes::queue::apply_command))
        // Records
        .route("/api/records", post(routes::records::discover_record))
        .route("/api/records/upload", post(routes::records::upload_records))
        // Calls
        .route(
            "/api/calls/{row_number}/events",
            post(routes::calls::report_event),
        )
        // Config
        .route("/api/config", get(routes::config::get_config))
        .fallback(embed::static_handler)
        .layer(cors)
        .with_state(app_state)
}

/// Start the operator console and API server for the project at `root`.
///
/// `port` overrides `server.port` from the config.
pub async fn serve(root: PathBuf, port: Option<u16>, open_browser: bool) -> anyhow::Result<()> {
    let app_state = state::AppState::load(root)?;
    let port = port.unwrap_or(app_state.config.server.port);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener, open_browser).await
}

/// Start the server on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(
    app_state: state::AppState,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let (records, dispatcher) = (
        app_state.runtime.read(|engine| engine.store().len()),
        app_state.runtime.dispatcher_name(),
    );
    let app = build_router(app_state);

    tracing::info!(records, dispatcher, "carecall listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
