//! 세션 로스터 (호스트 전용, 단일 writer)

use crate::error::JoinError;
use crate::identity::{generate_player_id, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_NAME_CHARS: usize = 32;

/// 로스터 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub connected: bool,
    pub joined_at: u64,
}

/// 특정 시점의 로스터 (불변 값)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub version: u64,
    pub players: Vec<PlayerRecord>,
}

impl RosterSnapshot {
    pub fn get(&self, id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }
}

/// 검증된 참가 요청
#[derive(Debug, Clone)]
pub struct JoinCandidate {
    name: String,
    avatar: Option<String>,
    rejoin_id: Option<PlayerId>,
}

impl JoinCandidate {
    pub fn new(
        name: &str,
        avatar: Option<String>,
        rejoin_id: Option<PlayerId>,
    ) -> Result<Self, JoinError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JoinError::InvalidRequest("name must not be empty".to_string()));
        }
        let name = name.chars().take(MAX_NAME_CHARS).collect();
        let avatar = avatar.filter(|a| !a.trim().is_empty());

        Ok(Self {
            name,
            avatar,
            rejoin_id,
        })
    }
}

/// 참가 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// 새 항목이 추가됨
    Joined(PlayerRecord),
    /// 연결이 끊겼던 항목이 복구됨
    Rejoined(PlayerRecord),
    /// 아직 연결 중으로 보이는 항목을 새 연결이 가져감
    Replaced(PlayerRecord),
}

impl Admission {
    pub fn record(&self) -> &PlayerRecord {
        match self {
            Admission::Joined(r) | Admission::Rejoined(r) | Admission::Replaced(r) => r,
        }
    }
}

/// 권위 있는 로스터. 삽입 순서 = 참가 순서
#[derive(Debug)]
pub struct Roster {
    players: Vec<PlayerRecord>,
    /// 정리(prune)된 ID. 다시 발급되지 않는다.
    retired: HashSet<PlayerId>,
    max_players: usize,
    version: u64,
}

impl Roster {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: Vec::new(),
            retired: HashSet::new(),
            max_players,
            version: 0,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// 신규 참가 또는 재접속. 실패 시 로스터는 변경되지 않는다.
    pub fn add_or_rejoin(&mut self, candidate: JoinCandidate) -> Result<Admission, JoinError> {
        let existing = candidate
            .rejoin_id
            .and_then(|id| self.players.iter().position(|p| p.id == id));

        if let Some(index) = existing {
            if self.players[index].connected {
                // 이전 연결의 close 를 아직 못 본 경우. 인원 수는 그대로다.
                self.version += 1;
                return Ok(Admission::Replaced(self.players[index].clone()));
            }
            if self.connected_count() + 1 > self.max_players {
                return Err(JoinError::RoomFull);
            }
            let record = &mut self.players[index];
            record.connected = true;
            let record = record.clone();
            self.version += 1;
            return Ok(Admission::Rejoined(record));
        }

        if self.connected_count() + 1 > self.max_players {
            return Err(JoinError::RoomFull);
        }

        let id = self.fresh_id();
        let record = PlayerRecord {
            id,
            name: candidate.name,
            avatar: candidate.avatar,
            connected: true,
            joined_at: unix_now(),
        };
        self.players.push(record.clone());
        self.version += 1;
        Ok(Admission::Joined(record))
    }

    /// 연결 해제 표시. 항목은 삭제하지 않는다.
    /// 상태가 바뀐 경우에만 Some 을 돌려준다.
    pub fn mark_disconnected(&mut self, id: &PlayerId) -> Option<PlayerRecord> {
        let record = self.players.iter_mut().find(|p| &p.id == id)?;
        if !record.connected {
            return None;
        }
        record.connected = false;
        let record = record.clone();
        self.version += 1;
        Some(record)
    }

    /// 연결이 끊긴 항목 제거 (PruneAfter 정책 전용)
    pub fn prune(&mut self, id: &PlayerId) -> Option<PlayerRecord> {
        let index = self
            .players
            .iter()
            .position(|p| &p.id == id && !p.connected)?;
        let record = self.players.remove(index);
        self.retired.insert(record.id);
        self.version += 1;
        Some(record)
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot {
            version: self.version,
            players: self.players.clone(),
        }
    }

    fn fresh_id(&self) -> PlayerId {
        let id = generate_player_id();
        assert!(
            self.get(&id).is_none() && !self.retired.contains(&id),
            "player id {id} issued twice"
        );
        id
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
