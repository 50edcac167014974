//! 세션 계층: 호스트(단일 writer)와 플레이어(읽기 전용 미러)

pub mod broadcast;
pub mod host;
pub mod player;

use crate::identity::PlayerId;
use crate::roster::{PlayerRecord, RosterSnapshot};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use host::HostSession;
pub use player::{PlayerProfile, PlayerSession};

/// 세션 구독자 채널 용량
pub(crate) const EVENT_CAPACITY: usize = 256;

/// 연결 후 JoinRequest 를 기다리는 기본 시간
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(10);

/// 연결이 끊긴 플레이어 항목 처리 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// 세션이 끝날 때까지 남겨둔다
    #[default]
    Retain,
    /// 지정 시간 안에 재접속하지 않으면 로스터에서 제거
    PruneAfter(Duration),
}

/// 세션 설정
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub max_players: usize,
    /// 게임 선택자 (조인 URL 의 `game` 파라미터)
    pub game: Option<String>,
    /// 게임별 파라미터. 코어는 해석하지 않는다.
    pub params: serde_json::Value,
    pub disconnect_policy: DisconnectPolicy,
    /// 이 시간 안에 참가하지 않은 연결은 거절 후 닫는다
    pub admission_timeout: Duration,
}

impl SessionConfig {
    pub fn new(max_players: usize) -> Self {
        Self {
            max_players,
            game: None,
            params: serde_json::Value::Null,
            disconnect_policy: DisconnectPolicy::Retain,
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
        }
    }

    pub fn with_game(mut self, game: impl Into<String>) -> Self {
        self.game = Some(game.into());
        self
    }

    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }
}

/// UI 가 보는 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Hosting,
    Joining,
    Connected,
    Disconnected,
    Ended,
}

/// 세션 구독자에게 전달되는 이벤트
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    RosterChanged {
        roster: RosterSnapshot,
    },
    PlayerJoined {
        player: PlayerRecord,
    },
    PlayerRejoined {
        player: PlayerRecord,
    },
    PlayerDisconnected {
        player: PlayerRecord,
    },
    PlayerPruned {
        player_id: PlayerId,
    },
    /// 게임 페이로드. 호스트 쪽에서는 보낸 플레이어, 플레이어 쪽에서는 None
    GameState {
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<PlayerId>,
        data: serde_json::Value,
    },
    /// 플레이어 쪽: 호스트가 세션을 끝내지 않았는데 채널이 닫힘
    Disconnected,
    Ended,
}
