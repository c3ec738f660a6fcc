use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::time::interval;
use tracing::Instrument;
use uuid::Uuid;

use crate::middleware::AuthContext;
use crate::realtime::ConnectionContext;
use crate::state::AppState;

pub(super) async fn upgrade(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ws: WebSocketUpgrade,
) -> Response {
    let connection = ConnectionContext {
        connection_id: Uuid::now_v7().to_string(),
        verified: auth.actor,
    };
    let span = tracing::info_span!(
        "gateway_connection",
        connection_id = %connection.connection_id
    );
    ws.on_upgrade(move |socket| serve_connection(socket, state, connection).instrument(span))
}

async fn serve_connection(socket: WebSocket, state: AppState, connection: ConnectionContext) {
    let gateway = state.gateway.clone();
    let mut outbound = gateway.open(&connection.connection_id).await;
    tracing::info!(
        verified = connection.verified.is_some(),
        "gateway connection opened"
    );

    let (mut sender, mut incoming) = socket.split();
    let heartbeat_every = Duration::from_secs(state.config.gateway_heartbeat_secs.max(1));
    let writer = tokio::spawn(
        async move {
            let mut heartbeat = interval(heartbeat_every);
            loop {
                tokio::select! {
                    frame = outbound.recv() => {
                        let Some(frame) = frame else {
                            break;
                        };
                        if sender.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    _ = heartbeat.tick() => {
                        if sender.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = sender.close().await;
        }
        .in_current_span(),
    );

    while let Some(incoming) = incoming.next().await {
        match incoming {
            Ok(Message::Text(text)) => gateway.handle_text(&connection, &text).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => gateway.handle_text(&connection, text).await,
                Err(_) => tracing::debug!("ignoring non-utf8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(err) => {
                tracing::debug!(error = %err, "gateway read failed");
                break;
            }
        }
    }

    gateway.close(&connection.connection_id).await;
    writer.abort();
    tracing::info!("gateway connection closed");
}
