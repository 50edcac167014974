//! 세션 컨텍스트 (UI 가 바인딩하는 façade)
//!
//! 상태는 `watch` 채널 하나로 노출되고, UI 는 구독 후 변경마다 다시 그린다.
//! 전역 싱글톤이 아니라 명시적으로 만들어 넘기는 값이므로 테스트에서 여러 개를
//! 동시에 둘 수 있다.

use crate::error::{ConnectionError, JoinError, SessionError};
use crate::identity::{PlayerId, RoomId};
use crate::roster::RosterSnapshot;
use crate::session::{
    ConnectionState, HostSession, PlayerProfile, PlayerSession, SessionConfig, SessionEvent,
};
use crate::transport::Transport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// UI 가 읽는 현재 상태
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextView {
    pub room_id: Option<RoomId>,
    /// 플레이어 프로세스일 때 자신의 ID
    pub player_id: Option<PlayerId>,
    pub roster: RosterSnapshot,
    pub state: ConnectionState,
}

enum Active {
    Idle,
    Host(HostSession),
    Player(PlayerSession),
}

pub struct SessionContext {
    transport: Arc<dyn Transport>,
    join_timeout: Duration,
    active: Mutex<(Active, Option<JoinHandle<()>>)>,
    view: Arc<watch::Sender<ContextView>>,
}

impl SessionContext {
    pub fn new(transport: Arc<dyn Transport>, join_timeout: Duration) -> Self {
        let (view, _) = watch::channel(ContextView::default());
        Self {
            transport,
            join_timeout,
            active: Mutex::new((Active::Idle, None)),
            view: Arc::new(view),
        }
    }

    pub fn view(&self) -> ContextView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ContextView> {
        self.view.subscribe()
    }

    /// 현재 세션의 이벤트 구독
    pub async fn events(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        match &self.active.lock().await.0 {
            Active::Idle => None,
            Active::Host(host) => Some(host.subscribe()),
            Active::Player(player) => Some(player.subscribe()),
        }
    }

    /// 새 세션 호스팅. 진행 중인 세션은 먼저 끝낸다.
    pub async fn host_session(&self, config: SessionConfig) -> Result<HostSession, ConnectionError> {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;

        let host = HostSession::start(self.transport.as_ref(), config).await?;
        let room_id = host.room_id().clone();
        let forwarder = spawn_forwarder(
            self.view.clone(),
            host.watch_roster(),
            host.watch_state(),
        );

        self.view.send_replace(ContextView {
            room_id: Some(room_id),
            player_id: None,
            roster: host.roster(),
            state: host.state(),
        });
        *active = (Active::Host(host.clone()), Some(forwarder));
        Ok(host)
    }

    /// 방 참가. 진행 중인 세션은 먼저 끝낸다.
    pub async fn join_session(
        &self,
        room_id: &RoomId,
        profile: &PlayerProfile,
        rejoin_id: Option<PlayerId>,
    ) -> Result<PlayerId, JoinError> {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;

        self.view.send_replace(ContextView {
            room_id: Some(room_id.clone()),
            state: ConnectionState::Joining,
            ..ContextView::default()
        });

        let player = match PlayerSession::join(
            self.transport.as_ref(),
            room_id,
            profile,
            rejoin_id,
            self.join_timeout,
        )
        .await
        {
            Ok(player) => player,
            Err(e) => {
                self.view.send_replace(ContextView {
                    room_id: Some(room_id.clone()),
                    state: ConnectionState::Disconnected,
                    ..ContextView::default()
                });
                return Err(e);
            }
        };

        let player_id = player.player_id();
        let forwarder = spawn_forwarder(
            self.view.clone(),
            player.watch_roster(),
            player.watch_state(),
        );
        self.view.send_replace(ContextView {
            room_id: Some(room_id.clone()),
            player_id: Some(player_id),
            roster: player.roster(),
            state: player.state(),
        });
        *active = (Active::Player(player), Some(forwarder));
        Ok(player_id)
    }

    /// 호스트면 세션 종료, 플레이어면 나가기
    pub async fn end_session(&self) {
        let mut active = self.active.lock().await;
        self.teardown(&mut active).await;
    }

    /// 호스트: 모든 플레이어에게, 플레이어: 호스트에게
    pub async fn send_game_state(&self, data: serde_json::Value) -> Result<(), SessionError> {
        match &self.active.lock().await.0 {
            Active::Idle => Err(SessionError::NotActive),
            Active::Host(host) => host.broadcast_game_state(data),
            Active::Player(player) => Ok(player.send_game_state(data)?),
        }
    }

    async fn teardown(&self, active: &mut (Active, Option<JoinHandle<()>>)) {
        if let Some(forwarder) = active.1.take() {
            forwarder.abort();
        }
        match std::mem::replace(&mut active.0, Active::Idle) {
            Active::Idle => return,
            Active::Host(host) => host.end().await,
            Active::Player(player) => player.leave(),
        }
        self.view.send_modify(|view| {
            view.state = ConnectionState::Ended;
        });
    }
}

/// 세션의 roster / state 변경을 컨텍스트 뷰로 옮긴다
fn spawn_forwarder(
    view: Arc<watch::Sender<ContextView>>,
    mut roster: watch::Receiver<RosterSnapshot>,
    mut state: watch::Receiver<ConnectionState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let open = tokio::select! {
                changed = roster.changed() => changed.is_ok(),
                changed = state.changed() => changed.is_ok(),
            };
            let snapshot = roster.borrow_and_update().clone();
            let current = *state.borrow_and_update();
            view.send_modify(|view| {
                view.roster = snapshot;
                view.state = current;
            });
            if !open {
                break;
            }
        }
    })
}
