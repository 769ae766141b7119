use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::broadcast::session;

use super::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let broadcaster = state.broadcaster.clone();
    let write_timeout = state.config.broadcast.write_timeout;
    ws.on_upgrade(move |socket| session::attach(socket, broadcaster, write_timeout))
}
