//! Websocket client sessions.
//!
//! Each accepted socket is registered with the [`Broadcaster`] and split in
//! two: a writer task drains the client's frame queue into the socket, and
//! the session loop reads from the socket only to notice when it closes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};

use super::broadcaster::Broadcaster;

pub async fn attach(socket: WebSocket, broadcaster: Arc<Broadcaster>, write_timeout: Duration) {
    let subscription = broadcaster.register();
    let id = subscription.id;
    let mut frames = subscription.frames;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let send = ws_tx.send(Message::Text(frame.to_string().into()));
            match tokio::time::timeout(write_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::debug!("[{}] Write failed: {}", id, e);
                    return;
                }
                Err(_) => {
                    log::warn!("[{}] Write stalled for {:?}, closing", id, write_timeout);
                    return;
                }
            }
        }
        // Queue closed: the broadcaster dropped this client.
        let _ = ws_tx.close().await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    log::debug!("[{}] Client closed connection", id);
                    break;
                }
                Ok(Message::Text(text)) => {
                    log::debug!("[{}] Ignoring client message: {}", id, text.as_str());
                }
                Ok(_) => {}
                Err(e) => {
                    log::debug!("[{}] WebSocket error: {}", id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    broadcaster.unregister(&id);
    log::info!("[{}] Session ended", id);
}
