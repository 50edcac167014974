//! 연결 핸들러 (플레이어 웹소켓, 헬스 체크)

use super::ApiError;
use crate::identity::RoomId;
use crate::state::AppState;
use crate::transport::{websocket::bridge, Transport};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{Html, IntoResponse},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize)]
pub struct JoinQuery {
    pub room: Option<String>,
    #[serde(rename = "roomCode")]
    pub room_code: Option<String>,
}

/// 플레이어 웹소켓. 방이 없으면 업그레이드 전에 404
///
/// 이후 프레임은 참가 프로토콜 메시지이며, 만원 등 거절은 프로토콜 안에서 전달된다.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<JoinQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = query
        .room
        .or(query.room_code)
        .ok_or_else(|| ApiError::BadRequest("missing room parameter".to_string()))?;
    let room_id = RoomId::parse(&raw).ok_or(ApiError::RoomNotFound(raw))?;

    let connection = state.transport.dial(&room_id).await?;
    tracing::info!(room_id = %room_id, conn = %connection.id(), "Player socket connecting");

    Ok(ws.on_upgrade(move |socket| bridge(socket, connection)))
}

pub async fn index_handler() -> Html<&'static str> {
    Html("<h1>Party Session Host</h1><p>Player WebSocket endpoint: /ws?room=CODE</p>")
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "party-session-rs",
        "rooms": state.rooms.len(),
        "timestamp": SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }))
}
