use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use muster_api::{AppState, AppStateInner, attendees, events, images};
use muster_gateway::{Dispatcher, connection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muster=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("MUSTER_DB_PATH").unwrap_or_else(|_| "muster.db".into());
    let host = std::env::var("MUSTER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("MUSTER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(muster_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher,
    });

    // Routes
    let app = Router::new()
        .route("/api/events", get(events::list).post(events::create))
        .route(
            "/api/events/{event_id}/attendees",
            get(attendees::list).post(attendees::register),
        )
        .route("/api/attendees/{attendee_id}/checkin", post(attendees::check_in))
        .route("/api/attendees/{attendee_id}/carplate", post(attendees::set_car_plate))
        .route("/api/events/{event_id}/image", get(images::get).post(images::set))
        .route("/api/events/{event_id}/reset", post(events::reset))
        .route("/api/events/{event_id}/stats", get(events::stats))
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Muster server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), state.db.clone())
    })
}
