use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use talkto_core::AppState;
use tokio::sync::broadcast::error::RecvError;

use crate::session::Session;

const PING_INTERVAL: Duration = Duration::from_secs(20);
/// Close code asking the client to reconnect and resynchronize.
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

pub async fn handle_connection(socket: WebSocket, state: AppState, mut session: Session) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.event_bus.subscribe(session.room_id);
    let mut ws_ping_interval = tokio::time::interval(PING_INTERVAL);
    ws_ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        user_id = session.user_id,
        room_id = session.room_id,
        session_id = %session.session_id,
        "push connection opened"
    );

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break "client closed".to_string(),
                    Some(Err(err)) => break format!("websocket receive error: {err}"),
                    // The channel is push-only; inbound frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let frame = match serde_json::to_string(event.as_ref()) {
                            Ok(frame) => frame,
                            Err(err) => {
                                tracing::error!("failed to encode {} event: {err}", event.name());
                                continue;
                            }
                        };
                        let seq = session.next_sequence();
                        tracing::trace!(session_id = %session.session_id, seq, event = event.name(), "dispatch");
                        if sender.send(Message::Text(frame.into())).await.is_err() {
                            break "websocket send error".to_string();
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            user_id = session.user_id,
                            room_id = session.room_id,
                            "push stream lagged (missed {skipped} events); forcing reconnect"
                        );
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: CLOSE_TRY_AGAIN_LATER,
                                reason: "fell behind; reconnect required".into(),
                            })))
                            .await;
                        break format!("event stream lagged by {skipped} events");
                    }
                    Err(RecvError::Closed) => break "event stream closed".to_string(),
                }
            }
            _ = ws_ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    drop(events);
    state.event_bus.prune(session.room_id);
    tracing::info!(
        user_id = session.user_id,
        room_id = session.room_id,
        sent = session.sequence,
        "push connection closed: {disconnect_reason}"
    );
}
