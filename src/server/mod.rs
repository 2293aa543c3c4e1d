//! Device-facing web server: bootstraps [`ServerState`] (the shared
//! services every connection handler needs) and wires the axum router.
//!
//! Grounded on the teacher's `server/mod.rs` (`ServerState` bundling
//! `Arc`-wrapped shared services, CORS/trace layers, `axum::serve`
//! bootstrap) with the JWT-gated personal-agent HTTP surface dropped —
//! the device WebSocket protocol in spec §6 carries no bearer token,
//! only a `hello` handshake — and the device WS route replaced by
//! [`voice_ws::handle_socket`].

pub mod control_plane;
pub mod voice_ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::{Html, Response},
    routing::get,
    Router,
};
use reqwest::Client;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::server::control_plane::ControlPlaneClient;
use crate::voice::wakeword::WakeWordCache;

/// Shared, cheaply-cloneable services every device connection handler
/// needs. Mirrors the teacher's `ServerState` shape (one `Arc` per
/// shared service, constructed once at startup per spec §9's "Global
/// singletons... recast as explicit services... passed by reference
/// into session factories").
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub http_client: Client,
    pub control_plane: Option<Arc<ControlPlaneClient>>,
    pub wake_cache: Arc<WakeWordCache>,
}

/// Start the device WebSocket server.
pub async fn start(host: &str, port: u16) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let state = build_state(config)?;

    let addr: SocketAddr = format!("{host}:{port}").parse().context("invalid host/port")?;

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/", get(index_page))
        .route("/xiaozhi/v1/", get(device_ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(%addr, "voice server listening");
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server loop exited")?;
    Ok(())
}

fn build_state(config: Config) -> Result<ServerState> {
    let http_client = Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let control_plane = if config.control_plane.base_url.is_empty() {
        None
    } else {
        Some(Arc::new(ControlPlaneClient::new(
            http_client.clone(),
            config.control_plane.base_url.clone(),
            config.control_plane.secret.clone(),
            config.retry.to_policy(),
        )))
    };

    let wake_cache = Arc::new(WakeWordCache::new(config.wakeup_words.fallback_greeting.clone()));

    Ok(ServerState { config: Arc::new(config), http_client, control_plane, wake_cache })
}

async fn index_page() -> Html<&'static str> {
    Html(
        "<html><body><h1>Xiaozhi voice server</h1>\
         <p>Device WebSocket endpoint: <code>/xiaozhi/v1/</code></p></body></html>",
    )
}

async fn device_ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(|socket| voice_ws::handle_socket(socket, state))
}
