mod config;
mod seed;

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

use syr_api::{AppState, AppStateInner};
use syr_core::{CredentialVerifier, MessageStore, RoutingEngine, ServiceDirectory};
use syr_db::Database;
use syr_gateway::{Dispatcher, GatewayContext, connection};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syr=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    {
        let db = db.clone();
        let seed_file = config.seed_file.clone();
        tokio::task::spawn_blocking(move || seed::provision_users(&db, &seed_file)).await??;
    }

    // Core components
    let directory = Arc::new(ServiceDirectory::load(&db)?);
    let store = MessageStore::new(db.clone(), config.store_timeout);
    let router = RoutingEngine::new(store, directory);
    let verifier = CredentialVerifier::new(db);
    let dispatcher = Dispatcher::new();

    let gateway = GatewayContext {
        dispatcher: dispatcher.clone(),
        verifier: verifier.clone(),
        router: router.clone(),
        jwt_secret: config.jwt_secret.as_str().into(),
    };

    let app_state: AppState = Arc::new(AppStateInner {
        verifier,
        router,
        dispatcher,
        jwt_secret: config.jwt_secret.clone(),
    });

    // Routes
    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(gateway);

    let app = syr_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("SYR server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(ctx): State<GatewayContext>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}
