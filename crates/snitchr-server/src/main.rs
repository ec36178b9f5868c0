use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use snitchr_api::AppStateInner;
use snitchr_gateway::Dispatcher;

struct Config {
    host: String,
    port: u16,
    db_path: PathBuf,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("SNITCHR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("SNITCHR_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()?;
        let db_path = std::env::var("SNITCHR_DB_PATH")
            .unwrap_or_else(|_| "snitchr.db".into())
            .into();
        Ok(Self { host, port, db_path })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snitchr_server=debug,snitchr_api=debug,snitchr_gateway=debug,snitchr_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = snitchr_db::Database::open(&config.db_path)?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state = AppStateInner::new(db, dispatcher.clone());

    let app = Router::new()
        .merge(snitchr_api::router(app_state))
        .merge(snitchr_gateway::router(dispatcher))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Snitchr server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
