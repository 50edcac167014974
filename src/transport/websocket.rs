//! 웹소켓 ↔ Connection 브리지
//!
//! 브라우저 플레이어는 웹소켓으로 붙고, 호스트 세션은 그 뒤의
//! `Connection` 만 본다.

use super::Connection;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};

/// 어느 한쪽이 닫힐 때까지 프레임을 양방향으로 전달
pub async fn bridge(socket: WebSocket, connection: Connection) {
    let conn_id = connection.id();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (sender, mut receiver) = connection.split();

    // 송신 태스크 (세션 → 웹소켓)
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // 수신 태스크 (웹소켓 → 세션)
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if sender.send(text).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(conn = %conn_id, "WebSocket bridge closed");
}
