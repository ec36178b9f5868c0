use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, warn};

use snitchr_db::Database;
use snitchr_gateway::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn new(db: Database, dispatcher: Dispatcher) -> AppState {
        Arc::new(Self { db, dispatcher })
    }
}

/// Run a blocking DB call off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("database task failed"))
        })?
        .map_err(ApiError::Internal)
}

/// Record an analytics event. Failures are logged, never returned.
pub(crate) async fn track(state: &AppState, event_type: &'static str, data: serde_json::Value) {
    let payload = data.to_string();
    if let Err(e) = run_db(state, move |db| db.record_event(event_type, &payload)).await {
        warn!("Failed to track analytics event {}: {}", event_type, e);
    }
}
