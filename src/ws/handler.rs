//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Outbound, SessionKey, WorldEvent, OUTBOUND_QUEUE};
use crate::util::rate_limit::ConnectionRateLimiter;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session: SessionKey = Uuid::new_v4();
    debug!(session = %session, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    let events_tx = state.match_handle.events_tx.clone();

    if events_tx
        .send(WorldEvent::Connect { session, tx })
        .await
        .is_err()
    {
        error!(session = %session, "Match task is gone, dropping connection");
        return;
    }

    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);
    run_session(session, ws_sink, ws_stream, rx, events_tx, rate_limiter).await;

    debug!(session = %session, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session: SessionKey,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    events_tx: mpsc::Sender<WorldEvent>,
    rate_limiter: ConnectionRateLimiter,
) {
    // Writer task: match task frames -> WebSocket. Ends when the match task
    // closes the connection (kick, restart) or drops its handle.
    let mut writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                Outbound::Text(json) => {
                    if let Err(e) = ws_sink.send(Message::Text(json)).await {
                        debug!(session = %session, error = %e, "WebSocket send failed");
                        return;
                    }
                }
                Outbound::Close => break,
            }
        }
        let _ = ws_sink.send(Message::Close(None)).await;
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> match task
    loop {
        let result = tokio::select! {
            _ = &mut writer_handle => {
                debug!(session = %session, "Writer finished, closing reader");
                break;
            }
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(session = %session, "Rate limited inbound message");
                    continue;
                }

                let event = WorldEvent::Message { session, text };
                if events_tx.send(event).await.is_err() {
                    debug!(session = %session, "Event channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session = %session, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session = %session, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session = %session, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to the match task
    let _ = events_tx.send(WorldEvent::Disconnect { session }).await;

    writer_handle.abort();
}
