use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use lingolive_translation::{ClientMessage, Participant, ServerEvent};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::registry::{ParticipantSession, RegistryError, WsSender};
use crate::state::AppState;

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

enum Flow {
    Continue,
    Close,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(%connection_id, "WebSocket connected");

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));
    let mut session: Option<Arc<ParticipantSession>> = None;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match handle_control(&state, &connection_id, &sender, &mut session, text.as_str())
                    .await
                {
                    Flow::Continue => {}
                    Flow::Close => break,
                }
            }
            Ok(Message::Binary(data)) => {
                // Raw PCM16 frames; meaningless before a join.
                if session.is_some() {
                    state.engine.ingest_audio(&connection_id, data.to_vec()).await;
                }
            }
            Ok(Message::Ping(data)) => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(%connection_id, %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    if let Some(joined) = &session {
        joined.mark_closed();
        state.engine.stop_pipeline(&connection_id).await;
        state.registry.remove(&connection_id);
    }

    info!(%connection_id, "WebSocket disconnected");
}

async fn handle_control(
    state: &AppState,
    connection_id: &str,
    sender: &WsSender,
    session: &mut Option<Arc<ParticipantSession>>,
    text: &str,
) -> Flow {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(%connection_id, %e, "malformed control frame");
            send_error(sender, "malformed control frame").await;
            return Flow::Continue;
        }
    };

    match message {
        ClientMessage::Join {
            meeting_id,
            attendee_id,
            attendee_name,
            spoken_language,
            target_language,
        } => {
            if session.is_some() {
                send_error(sender, "already joined").await;
                return Flow::Continue;
            }

            let participant = Participant {
                connection_id: connection_id.to_string(),
                meeting_id,
                attendee_id,
                display_name: attendee_name,
                spoken_locale: spoken_language,
                target_locale: target_language,
            };

            let new_session = ParticipantSession::new(participant.clone(), Arc::clone(sender));
            match state.registry.add(Arc::clone(&new_session)) {
                Ok(()) => {
                    state.engine.start_pipeline(participant).await;
                    *session = Some(new_session);
                    send_event(
                        sender,
                        &ServerEvent::Joined {
                            connection_id: connection_id.to_string(),
                        },
                    )
                    .await;
                    Flow::Continue
                }
                Err(RegistryError::MeetingFull) => {
                    warn!(
                        %connection_id,
                        meeting_id = %new_session.participant.meeting_id,
                        attendee_name = %new_session.participant.display_name,
                        "join refused, meeting is full"
                    );
                    send_error(sender, "meeting is full").await;
                    Flow::Close
                }
            }
        }
        ClientMessage::MicOn => {
            if session.is_none() {
                send_error(sender, "not joined").await;
                return Flow::Continue;
            }
            state.engine.mic_on(connection_id).await;
            Flow::Continue
        }
        ClientMessage::MicOff => {
            if session.is_none() {
                send_error(sender, "not joined").await;
                return Flow::Continue;
            }
            state.engine.mic_off(connection_id).await;
            Flow::Continue
        }
        ClientMessage::Stop => {
            if session.is_none() {
                send_error(sender, "not joined").await;
                return Flow::Continue;
            }
            state.engine.stop(connection_id).await;
            Flow::Continue
        }
    }
}

async fn send_event(sender: &WsSender, event: &ServerEvent) {
    let Ok(text) = serde_json::to_string(event) else {
        return;
    };
    let mut guard = sender.lock().await;
    let _ = guard.send(Message::text(text)).await;
}

async fn send_error(sender: &WsSender, message: &str) {
    send_event(
        sender,
        &ServerEvent::Error {
            message: message.to_string(),
        },
    )
    .await;
}
