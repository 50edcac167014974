//! 방 관리 핸들러 (호스트 화면용)

use super::ApiError;
use crate::identity::RoomId;
use crate::join_url::build_join_url;
use crate::protocol::encode;
use crate::qr;
use crate::roster::RosterSnapshot;
use crate::session::{ConnectionState, HostSession, SessionEvent};
use crate::state::{AppState, HostedRoom};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;

const MAX_PLAYERS_LIMIT: usize = 64;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub max_players: Option<usize>,
    pub game: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    pub join_url: String,
    pub qr_svg: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub state: ConnectionState,
    pub game: Option<String>,
    pub max_players: usize,
    pub join_url: String,
    pub roster: RosterSnapshot,
}

/// 방 생성 (호스팅 시작)
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    if let Some(max) = request.max_players {
        if max == 0 || max > MAX_PLAYERS_LIMIT {
            return Err(ApiError::BadRequest(format!(
                "maxPlayers must be between 1 and {MAX_PLAYERS_LIMIT}"
            )));
        }
    }

    let mut config = state.config.session.session_config(request.max_players);
    config.game = request.game.filter(|g| !g.trim().is_empty());
    config.params = request.params;

    let session = HostSession::start(&state.transport, config).await?;
    let room_id = session.room_id().clone();

    let join_url = build_join_url(
        &state.config.public_base_url,
        &room_id,
        session.config().game.as_deref(),
    )
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .to_string();
    let qr_svg = qr::render_svg(&join_url).map_err(|e| ApiError::Internal(e.to_string()))?;

    if let Ok(code) = qr::render_terminal(&join_url) {
        tracing::debug!(room_id = %room_id, "Join QR\n{}", code);
    }

    state.rooms.insert(
        room_id.clone(),
        HostedRoom {
            session,
            join_url: join_url.clone(),
            created_at: Instant::now(),
        },
    );
    tracing::info!(room_id = %room_id, join_url = %join_url, "Room created");

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_id,
            join_url,
            qr_svg,
        }),
    ))
}

/// 방 상태 + 로스터
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> Result<Json<RoomStatus>, ApiError> {
    let room_id = lookup(&state, &room)?;
    let entry = state
        .rooms
        .get(&room_id)
        .ok_or_else(|| ApiError::RoomNotFound(room.clone()))?;
    let session = &entry.session;

    Ok(Json(RoomStatus {
        room_id: room_id.clone(),
        state: session.state(),
        game: session.config().game.clone(),
        max_players: session.config().max_players,
        join_url: entry.join_url.clone(),
        roster: session.roster(),
    }))
}

/// 방 종료
pub async fn end_room(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> Result<StatusCode, ApiError> {
    let room_id = lookup(&state, &room)?;
    let (_, hosted) = state
        .rooms
        .remove(&room_id)
        .ok_or_else(|| ApiError::RoomNotFound(room.clone()))?;
    hosted.session.end().await;

    tracing::info!(room_id = %room_id, "Room ended by host");
    Ok(StatusCode::NO_CONTENT)
}

/// 호스트 화면 이벤트 스트림
pub async fn room_events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = lookup(&state, &room)?;
    let session = state
        .session(&room_id)
        .ok_or_else(|| ApiError::RoomNotFound(room.clone()))?;
    Ok(ws.on_upgrade(move |socket| stream_events(socket, session)))
}

async fn stream_events(socket: WebSocket, session: HostSession) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events = session.subscribe();

    // 현재 로스터부터
    let initial = SessionEvent::RosterChanged {
        roster: session.roster(),
    };
    if let Some(json) = encode(&initial) {
        if ws_sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let ended = event == SessionEvent::Ended;
                    if let Some(json) = encode(&event) {
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    if ended {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(room_id = %session.room_id(), skipped = skipped, "Host display lagged");
                    let catch_up = SessionEvent::RosterChanged { roster: session.roster() };
                    if let Some(json) = encode(&catch_up) {
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = ws_receiver.next() => match incoming {
                // 호스트 화면이 보낸 게임 상태는 모든 플레이어에게
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<serde_json::Value>(&text) {
                        Ok(data) => {
                            if session.broadcast_game_state(data).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Ignoring non-JSON host frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = ws_sender.send(Message::Close(None)).await;
    tracing::debug!(room_id = %session.room_id(), "Host display stream closed");
}

/// 오래된 방 정리 (연결된 플레이어가 없고 idle_timeout 을 넘긴 방)
pub async fn cleanup_idle_rooms(state: Arc<AppState>) {
    let timeout = state.config.session.idle_timeout;
    let now = Instant::now();

    let expired: Vec<RoomId> = state
        .rooms
        .iter()
        .filter(|entry| {
            let room = entry.value();
            room.session.is_ended()
                || (now.duration_since(room.created_at) > timeout
                    && room.session.roster().connected_count() == 0)
        })
        .map(|entry| entry.key().clone())
        .collect();

    let mut deleted = 0;
    for room_id in expired {
        if let Some((_, room)) = state.rooms.remove(&room_id) {
            room.session.end().await;
            tracing::info!(room_id = %room_id, "Cleaned up idle room");
            deleted += 1;
        }
    }

    if deleted > 0 {
        tracing::info!(deleted_rooms = deleted, "Cleanup completed");
    }
}

fn lookup(state: &AppState, raw: &str) -> Result<RoomId, ApiError> {
    let room_id = RoomId::parse(raw).ok_or_else(|| ApiError::RoomNotFound(raw.to_string()))?;
    if state.rooms.contains_key(&room_id) {
        Ok(room_id)
    } else {
        Err(ApiError::RoomNotFound(raw.to_string()))
    }
}
