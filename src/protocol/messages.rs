//! 호스트-플레이어 메시지 프로토콜 정의

use crate::identity::PlayerId;
use crate::roster::RosterSnapshot;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 플레이어 → 호스트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerMessage {
    // Connection
    Heartbeat,

    // Join Protocol
    JoinRequest {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejoin_id: Option<PlayerId>,
    },
    Leave,

    // Game
    GameState { data: serde_json::Value },
}

/// 호스트 → 플레이어 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HostMessage {
    // Connection
    HeartbeatAck,
    SessionEnded,

    // Join Protocol
    Joined {
        player_id: PlayerId,
        roster: RosterSnapshot,
    },
    Rejected {
        reason: RejectReason,
    },

    // Roster / Game
    Roster {
        roster: RosterSnapshot,
    },
    GameState {
        data: serde_json::Value,
    },
}

/// 참가 거절 사유
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    RoomFull,
    InvalidRequest { message: String },
}

/// 메시지 → 전송 프레임
pub fn encode<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode message");
            None
        }
    }
}

/// 전송 프레임 → 메시지
pub fn decode<T: DeserializeOwned>(frame: &str) -> Option<T> {
    match serde_json::from_str(frame) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed frame");
            None
        }
    }
}
