use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use whisper_api::auth::AuthService;
use whisper_api::{AppState, AppStateInner};
use whisper_gateway::connection;
use whisper_gateway::rooms::RoomRegistry;

#[derive(Clone)]
struct GatewayState {
    db: Arc<whisper_db::Database>,
    rooms: RoomRegistry,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("WHISPER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("WHISPER_DB_PATH").unwrap_or_else(|_| "whisper.db".into());
    let host = std::env::var("WHISPER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WHISPER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(whisper_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let rooms = RoomRegistry::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        auth: AuthService::new(jwt_secret.clone()),
    });
    let gateway_state = GatewayState {
        db,
        rooms,
        jwt_secret,
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = Router::new()
        .merge(whisper_api::routes(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Whisper server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.db, state.rooms, state.jwt_secret)
    })
}
