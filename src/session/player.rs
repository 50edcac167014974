//! 플레이어 세션
//!
//! 호스트가 밀어주는 로스터를 읽기 전용으로 미러링한다.

use super::{ConnectionState, SessionEvent, EVENT_CAPACITY};
use crate::error::{ConnectionError, JoinError, SendError};
use crate::identity::{PlayerId, RoomId};
use crate::protocol::{decode, encode, HostMessage, PlayerMessage, RejectReason};
use crate::roster::RosterSnapshot;
use crate::transport::{ConnectionReceiver, ConnectionSender, Transport};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// 참가 시 플레이어가 제출하는 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl PlayerProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: None,
        }
    }
}

/// 참가가 승인된 플레이어 세션. drop 되면 연결이 닫힌다.
pub struct PlayerSession {
    room_id: RoomId,
    player_id: PlayerId,
    sender: ConnectionSender,
    roster: watch::Receiver<RosterSnapshot>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
    reader: JoinHandle<()>,
}

impl PlayerSession {
    /// 방에 참가. 재시도는 하지 않는다.
    ///
    /// `rejoin_id` 가 연결이 끊긴 기존 항목과 일치하면 재접속으로 처리된다.
    /// `join_timeout` 안에 응답이 없거나 이 future 가 버려지면 연결은 닫힌다.
    pub async fn join(
        transport: &dyn Transport,
        room_id: &RoomId,
        profile: &PlayerProfile,
        rejoin_id: Option<PlayerId>,
        join_timeout: Duration,
    ) -> Result<Self, JoinError> {
        let connection = transport.dial(room_id).await?;
        let (sender, mut receiver) = connection.split();

        let request = PlayerMessage::JoinRequest {
            name: profile.name.clone(),
            avatar: profile.avatar.clone(),
            rejoin_id,
        };
        let frame = encode(&request)
            .ok_or_else(|| ConnectionError::Protocol("unencodable join request".to_string()))?;
        sender.send(frame).map_err(|_| ConnectionError::Closed)?;

        let (player_id, roster) =
            match tokio::time::timeout(join_timeout, await_admission(&mut receiver)).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(room_id = %room_id, "Join timed out");
                    return Err(ConnectionError::Timeout(join_timeout).into());
                }
            };

        let (roster_tx, roster_rx) = watch::channel(roster);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let reader = tokio::spawn(mirror(receiver, roster_tx, state_tx, events.clone()));

        tracing::info!(room_id = %room_id, player_id = %player_id, "Joined room");

        Ok(Self {
            room_id: room_id.clone(),
            player_id,
            sender,
            roster: roster_rx,
            state: state_rx,
            events,
            reader,
        })
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn roster(&self) -> RosterSnapshot {
        self.roster.borrow().clone()
    }

    pub fn watch_roster(&self) -> watch::Receiver<RosterSnapshot> {
        self.roster.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// 게임 페이로드를 호스트에게 전송
    pub fn send_game_state(&self, data: serde_json::Value) -> Result<(), SendError> {
        self.send(&PlayerMessage::GameState { data })
    }

    pub fn heartbeat(&self) -> Result<(), SendError> {
        self.send(&PlayerMessage::Heartbeat)
    }

    /// 세션에서 나가기
    pub fn leave(self) {
        let _ = self.send(&PlayerMessage::Leave);
        tracing::info!(room_id = %self.room_id, player_id = %self.player_id, "Left room");
    }

    fn send(&self, message: &PlayerMessage) -> Result<(), SendError> {
        let frame = encode(message).ok_or(SendError::Closed)?;
        self.sender.send(frame)
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn await_admission(
    receiver: &mut ConnectionReceiver,
) -> Result<(PlayerId, RosterSnapshot), JoinError> {
    while let Some(frame) = receiver.recv().await {
        match decode::<HostMessage>(&frame) {
            Some(HostMessage::Joined { player_id, roster }) => return Ok((player_id, roster)),
            Some(HostMessage::Rejected {
                reason: RejectReason::RoomFull,
            }) => return Err(JoinError::RoomFull),
            Some(HostMessage::Rejected {
                reason: RejectReason::InvalidRequest { message },
            }) => return Err(JoinError::InvalidRequest(message)),
            Some(HostMessage::SessionEnded) => break,
            _ => {}
        }
    }
    Err(ConnectionError::Closed.into())
}

/// 호스트 메시지를 받아 로컬 미러에 반영
async fn mirror(
    mut receiver: ConnectionReceiver,
    roster_tx: watch::Sender<RosterSnapshot>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
) {
    let mut ended = false;

    while let Some(frame) = receiver.recv().await {
        match decode::<HostMessage>(&frame) {
            Some(HostMessage::Roster { roster }) => {
                // 오래된 스냅샷은 무시
                if roster.version > roster_tx.borrow().version {
                    roster_tx.send_replace(roster.clone());
                    let _ = events.send(SessionEvent::RosterChanged { roster });
                }
            }
            Some(HostMessage::GameState { data }) => {
                let _ = events.send(SessionEvent::GameState { from: None, data });
            }
            Some(HostMessage::SessionEnded) => {
                ended = true;
                break;
            }
            Some(HostMessage::HeartbeatAck) => {
                tracing::trace!(conn = %receiver.id(), "Heartbeat acknowledged");
            }
            Some(other) => {
                tracing::debug!(message = ?other, "Unexpected message after admission");
            }
            None => {}
        }
    }

    let (state, event) = if ended {
        (ConnectionState::Ended, SessionEvent::Ended)
    } else {
        (ConnectionState::Disconnected, SessionEvent::Disconnected)
    };
    state_tx.send_replace(state);
    let _ = events.send(event);
    tracing::info!(state = ?state, "Host connection closed");
}
