pub mod connection;
pub mod dispatcher;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

pub use dispatcher::Dispatcher;

/// The `/feed` WebSocket route.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/feed", get(ws_upgrade))
        .with_state(dispatcher)
}

async fn ws_upgrade(State(dispatcher): State<Dispatcher>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}
