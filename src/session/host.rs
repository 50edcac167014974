//! 호스트 세션
//!
//! 로스터와 연결 맵은 액터 태스크 하나가 소유한다. 참가 요청, 연결 해제,
//! 정리 타이머는 모두 같은 큐를 거쳐 도착 순서대로 처리되므로 `max_players`
//! 검사에 경쟁 조건이 없다. 각 변경 후 새 스냅샷이 브로드캐스트된 다음에야
//! 다음 이벤트를 처리한다.

use super::broadcast::{broadcast_game_state, broadcast_roster};
use super::{ConnectionState, DisconnectPolicy, SessionConfig, SessionEvent, EVENT_CAPACITY};
use crate::error::{ConnectionError, JoinError, SendError, SessionError};
use crate::identity::{generate_room_id, PlayerId, RoomId};
use crate::protocol::{decode, encode, HostMessage, PlayerMessage, RejectReason};
use crate::roster::{Admission, JoinCandidate, Roster, RosterSnapshot};
use crate::transport::{
    Connection, ConnectionId, ConnectionReceiver, ConnectionSender, Listener, Transport,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// 방 코드 충돌 시 재시도 횟수
const ROOM_ID_ATTEMPTS: usize = 8;

/// 호스트 세션 핸들. 복제 가능하며, 마지막 핸들이 drop 되면 세션이 종료된다.
#[derive(Clone)]
pub struct HostSession {
    room_id: RoomId,
    config: Arc<SessionConfig>,
    commands: mpsc::UnboundedSender<Command>,
    roster: watch::Receiver<RosterSnapshot>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
}

enum Command {
    BroadcastGameState {
        data: serde_json::Value,
    },
    SendTo {
        player_id: PlayerId,
        data: serde_json::Value,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    End {
        done: oneshot::Sender<()>,
    },
}

/// 연결 리더 / 타이머 → 액터
enum Internal {
    Inbound {
        conn: ConnectionId,
        message: PlayerMessage,
    },
    /// 해석할 수 없는 프레임
    Malformed {
        conn: ConnectionId,
    },
    Closed {
        conn: ConnectionId,
    },
    AdmissionDue {
        conn: ConnectionId,
    },
    PruneDue {
        player_id: PlayerId,
        generation: u64,
    },
}

impl HostSession {
    /// 새 방 코드를 발급받아 세션 시작
    pub async fn start(
        transport: &dyn Transport,
        config: SessionConfig,
    ) -> Result<Self, ConnectionError> {
        let mut attempts = 0;
        let listener = loop {
            let room_id = generate_room_id();
            match transport.listen(&room_id).await {
                Ok(listener) => break listener,
                Err(ConnectionError::RoomInUse(_)) if attempts + 1 < ROOM_ID_ATTEMPTS => {
                    attempts += 1;
                    tracing::debug!(room_id = %room_id, "Room id collision, drawing again");
                }
                Err(e) => return Err(e),
            }
        };
        Ok(Self::spawn(listener, config))
    }

    /// 지정한 방 코드로 세션 시작
    pub async fn start_with_room_id(
        transport: &dyn Transport,
        room_id: RoomId,
        config: SessionConfig,
    ) -> Result<Self, ConnectionError> {
        let listener = transport.listen(&room_id).await?;
        Ok(Self::spawn(listener, config))
    }

    fn spawn(listener: Listener, config: SessionConfig) -> Self {
        let room_id = listener.room_id().clone();
        let config = Arc::new(config);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (roster_tx, roster_rx) = watch::channel(RosterSnapshot::default());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Hosting);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = HostActor {
            room_id: room_id.clone(),
            config: config.clone(),
            roster: Roster::new(config.max_players),
            links: HashMap::new(),
            bindings: HashMap::new(),
            prune_generations: HashMap::new(),
            next_generation: 0,
            internal_tx,
            roster_tx,
            state_tx,
            events: events.clone(),
        };
        tokio::spawn(actor.run(listener, commands_rx, internal_rx));

        tracing::info!(
            room_id = %room_id,
            max_players = config.max_players,
            game = ?config.game,
            "Session hosted"
        );

        Self {
            room_id,
            config,
            commands: commands_tx,
            roster: roster_rx,
            state: state_rx,
            events,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
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

    pub fn is_ended(&self) -> bool {
        self.commands.is_closed()
    }

    /// 모든 플레이어에게 게임 페이로드 전송
    pub fn broadcast_game_state(&self, data: serde_json::Value) -> Result<(), SessionError> {
        self.commands
            .send(Command::BroadcastGameState { data })
            .map_err(|_| SessionError::Ended)
    }

    /// 플레이어 한 명에게 게임 페이로드 전송
    pub async fn send_to(
        &self,
        player_id: PlayerId,
        data: serde_json::Value,
    ) -> Result<(), SessionError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::SendTo {
                player_id,
                data,
                reply,
            })
            .map_err(|_| SessionError::Ended)?;
        result.await.map_err(|_| SessionError::Ended)??;
        Ok(())
    }

    /// 세션 종료. 모든 연결을 닫고 방 코드를 반납한다. 여러 번 불러도 된다.
    pub async fn end(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::End { done }).is_err() {
            return;
        }
        let _ = finished.await;
    }
}

struct Link {
    sender: ConnectionSender,
    reader: JoinHandle<()>,
    player: Option<PlayerId>,
}

struct HostActor {
    room_id: RoomId,
    config: Arc<SessionConfig>,
    roster: Roster,
    /// 열린 연결 전부 (참가 대기 포함)
    links: HashMap<ConnectionId, Link>,
    /// 플레이어 -> 현재 연결
    bindings: HashMap<PlayerId, ConnectionId>,
    prune_generations: HashMap<PlayerId, u64>,
    next_generation: u64,
    internal_tx: mpsc::UnboundedSender<Internal>,
    roster_tx: watch::Sender<RosterSnapshot>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl HostActor {
    async fn run(
        mut self,
        mut listener: Listener,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        let done = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::End { done }) => break Some(done),
                    Some(Command::BroadcastGameState { data }) => self.broadcast(data),
                    Some(Command::SendTo { player_id, data, reply }) => {
                        let result = self.send_to_player(&player_id, &HostMessage::GameState { data });
                        let _ = reply.send(result);
                    }
                    // 모든 핸들이 drop 됨
                    None => break None,
                },
                Some(event) = internal.recv() => self.handle_internal(event),
                Some(connection) = listener.accept() => self.accept(connection),
            }
        };

        drop(commands);
        drop(listener);
        self.shutdown();
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn accept(&mut self, connection: Connection) {
        let (sender, receiver) = connection.split();
        let conn = sender.id();
        let reader = spawn_reader(receiver, self.internal_tx.clone());
        self.links.insert(
            conn,
            Link {
                sender,
                reader,
                player: None,
            },
        );
        tracing::debug!(room_id = %self.room_id, conn = %conn, "Peer connected, awaiting JoinRequest");

        let deadline = self.config.admission_timeout;
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = internal.send(Internal::AdmissionDue { conn });
        });
    }

    fn broadcast(&self, data: serde_json::Value) {
        let delivered = broadcast_game_state(self.connected_peers(), &data);
        tracing::debug!(room_id = %self.room_id, delivered = delivered, "Game state broadcast");
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Inbound { conn, message } => self.handle_message(conn, message),
            Internal::Malformed { conn } => {
                if self.is_pending(conn) {
                    self.reject(conn, JoinError::InvalidRequest("malformed message".to_string()));
                } else {
                    tracing::debug!(room_id = %self.room_id, conn = %conn, "Ignoring malformed frame");
                }
            }
            Internal::Closed { conn } => self.handle_close(conn),
            Internal::AdmissionDue { conn } => {
                if self.is_pending(conn) {
                    self.reject(
                        conn,
                        JoinError::InvalidRequest("no JoinRequest before deadline".to_string()),
                    );
                }
            }
            Internal::PruneDue {
                player_id,
                generation,
            } => self.handle_prune(player_id, generation),
        }
    }

    fn handle_message(&mut self, conn: ConnectionId, message: PlayerMessage) {
        let Some(player) = self.links.get(&conn).map(|link| link.player) else {
            return;
        };

        // 참가 전에는 JoinRequest 만 받는다
        let Some(player_id) = player else {
            match message {
                PlayerMessage::JoinRequest {
                    name,
                    avatar,
                    rejoin_id,
                } => {
                    let admission = JoinCandidate::new(&name, avatar, rejoin_id)
                        .and_then(|candidate| self.roster.add_or_rejoin(candidate));
                    match admission {
                        Ok(admission) => self.admit(conn, admission),
                        Err(e) => self.reject(conn, e),
                    }
                }
                _ => self.reject(
                    conn,
                    JoinError::InvalidRequest("expected JoinRequest".to_string()),
                ),
            }
            return;
        };

        match message {
            PlayerMessage::JoinRequest { .. } => {
                tracing::warn!(room_id = %self.room_id, conn = %conn, "Duplicate JoinRequest ignored");
            }
            PlayerMessage::GameState { data } => {
                let _ = self.events.send(SessionEvent::GameState {
                    from: Some(player_id),
                    data,
                });
            }
            PlayerMessage::Heartbeat => {
                if let (Some(link), Some(frame)) =
                    (self.links.get(&conn), encode(&HostMessage::HeartbeatAck))
                {
                    let _ = link.sender.send(frame);
                }
            }
            PlayerMessage::Leave => self.handle_close(conn),
        }
    }

    fn is_pending(&self, conn: ConnectionId) -> bool {
        self.links
            .get(&conn)
            .map(|link| link.player.is_none())
            .unwrap_or(false)
    }

    fn admit(&mut self, conn: ConnectionId, admission: Admission) {
        let record = admission.record().clone();

        // 이전 연결을 새 연결로 교체
        if let Some(previous) = self.bindings.insert(record.id, conn) {
            if previous != conn {
                self.close_link(previous);
            }
        }
        self.prune_generations.remove(&record.id);
        if let Some(link) = self.links.get_mut(&conn) {
            link.player = Some(record.id);
        }

        let snapshot = self.roster.snapshot();
        let _ = self.send_to_player(
            &record.id,
            &HostMessage::Joined {
                player_id: record.id,
                roster: snapshot,
            },
        );

        let event = match admission {
            Admission::Joined(_) => {
                tracing::info!(room_id = %self.room_id, player_id = %record.id, name = %record.name, "Player joined");
                SessionEvent::PlayerJoined { player: record }
            }
            Admission::Rejoined(_) | Admission::Replaced(_) => {
                tracing::info!(room_id = %self.room_id, player_id = %record.id, name = %record.name, "Player rejoined");
                SessionEvent::PlayerRejoined { player: record }
            }
        };
        self.publish(Some(event));
    }

    fn reject(&mut self, conn: ConnectionId, error: JoinError) {
        let reason = match error {
            JoinError::RoomFull => RejectReason::RoomFull,
            other => RejectReason::InvalidRequest {
                message: other.to_string(),
            },
        };
        tracing::warn!(room_id = %self.room_id, conn = %conn, reason = ?reason, "Join rejected");

        if let Some(link) = self.close_link(conn) {
            if let Some(frame) = encode(&HostMessage::Rejected { reason }) {
                let _ = link.sender.send(frame);
            }
        }
    }

    fn handle_close(&mut self, conn: ConnectionId) {
        let Some(link) = self.close_link(conn) else {
            return;
        };
        let Some(player_id) = link.player else {
            tracing::debug!(room_id = %self.room_id, conn = %conn, "Pending peer left");
            return;
        };
        if self.bindings.get(&player_id) != Some(&conn) {
            return;
        }
        self.bindings.remove(&player_id);

        if let Some(record) = self.roster.mark_disconnected(&player_id) {
            tracing::info!(room_id = %self.room_id, player_id = %player_id, "Player disconnected");
            self.schedule_prune(player_id);
            self.publish(Some(SessionEvent::PlayerDisconnected { player: record }));
        }
    }

    fn schedule_prune(&mut self, player_id: PlayerId) {
        let DisconnectPolicy::PruneAfter(delay) = self.config.disconnect_policy else {
            return;
        };
        self.next_generation += 1;
        let generation = self.next_generation;
        self.prune_generations.insert(player_id, generation);

        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::PruneDue {
                player_id,
                generation,
            });
        });
    }

    fn handle_prune(&mut self, player_id: PlayerId, generation: u64) {
        // 그 사이 재접속했다면 세대가 바뀌었거나 지워졌다
        if self.prune_generations.get(&player_id) != Some(&generation) {
            return;
        }
        self.prune_generations.remove(&player_id);

        if self.roster.prune(&player_id).is_some() {
            tracing::info!(room_id = %self.room_id, player_id = %player_id, "Disconnected player pruned");
            self.publish(Some(SessionEvent::PlayerPruned { player_id }));
        }
    }

    /// 새 스냅샷을 구독자와 플레이어들에게 전파
    fn publish(&mut self, event: Option<SessionEvent>) {
        let snapshot = self.roster.snapshot();
        self.roster_tx.send_replace(snapshot.clone());
        broadcast_roster(self.connected_peers(), &snapshot);

        if let Some(event) = event {
            let _ = self.events.send(event);
        }
        let _ = self.events.send(SessionEvent::RosterChanged { roster: snapshot });
    }

    fn connected_peers(&self) -> impl Iterator<Item = (&PlayerId, &ConnectionSender)> {
        self.bindings.iter().filter_map(move |(player_id, conn)| {
            self.links.get(conn).map(|link| (player_id, &link.sender))
        })
    }

    fn send_to_player(&self, player_id: &PlayerId, message: &HostMessage) -> Result<(), SendError> {
        let link = self
            .bindings
            .get(player_id)
            .and_then(|conn| self.links.get(conn))
            .ok_or(SendError::Closed)?;
        let frame = encode(message).ok_or(SendError::Closed)?;
        link.sender.send(frame)
    }

    /// 연결 정리. 리더를 멈추고 송신 측을 돌려준다 (drop 시 닫힘).
    fn close_link(&mut self, conn: ConnectionId) -> Option<Link> {
        let link = self.links.remove(&conn)?;
        link.reader.abort();
        Some(link)
    }

    fn shutdown(&mut self) {
        let frame = encode(&HostMessage::SessionEnded);
        for (_, link) in self.links.drain() {
            if let Some(frame) = &frame {
                let _ = link.sender.send(frame.clone());
            }
            link.reader.abort();
        }
        self.bindings.clear();
        self.prune_generations.clear();

        self.state_tx.send_replace(ConnectionState::Ended);
        let _ = self.events.send(SessionEvent::Ended);
        tracing::info!(room_id = %self.room_id, "Session ended");
    }
}

/// 연결 하나의 수신 루프. close 는 정확히 한 번 전달된다.
fn spawn_reader(
    mut receiver: ConnectionReceiver,
    internal: mpsc::UnboundedSender<Internal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let conn = receiver.id();
        while let Some(frame) = receiver.recv().await {
            let event = match decode::<PlayerMessage>(&frame) {
                Some(message) => Internal::Inbound { conn, message },
                None => Internal::Malformed { conn },
            };
            if internal.send(event).is_err() {
                return;
            }
        }
        let _ = internal.send(Internal::Closed { conn });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn room(code: &str) -> RoomId {
        RoomId::parse(code).unwrap()
    }

    async fn raw_join(
        transport: &MemoryTransport,
        room_id: &RoomId,
        name: &str,
    ) -> (ConnectionSender, ConnectionReceiver, HostMessage) {
        let (tx, mut rx) = transport.dial(room_id).await.unwrap().split();
        let request = PlayerMessage::JoinRequest {
            name: name.to_string(),
            avatar: None,
            rejoin_id: None,
        };
        tx.send(encode(&request).unwrap()).unwrap();
        let reply = decode(&rx.recv().await.unwrap()).unwrap();
        (tx, rx, reply)
    }

    #[tokio::test]
    async fn start_draws_a_fresh_room_id() {
        let transport = MemoryTransport::new();
        let a = HostSession::start(&transport, SessionConfig::new(4)).await.unwrap();
        let b = HostSession::start(&transport, SessionConfig::new(4)).await.unwrap();
        assert_ne!(a.room_id(), b.room_id());
        assert!(transport.is_listening(a.room_id()));
        assert_eq!(a.state(), ConnectionState::Hosting);
    }

    #[tokio::test]
    async fn first_message_must_be_join_request() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();

        let (tx, mut rx) = transport.dial(host.room_id()).await.unwrap().split();
        let bogus = PlayerMessage::GameState {
            data: serde_json::json!({"cheat": true}),
        };
        tx.send(encode(&bogus).unwrap()).unwrap();

        let reply: HostMessage = decode(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(
            reply,
            HostMessage::Rejected {
                reason: RejectReason::InvalidRequest { .. }
            }
        ));
        assert_eq!(rx.recv().await, None);
        assert!(host.roster().players.is_empty());
    }

    async fn expect_invalid_request(rx: &mut ConnectionReceiver) {
        let reply: HostMessage = decode(&rx.recv().await.unwrap()).unwrap();
        assert!(
            matches!(
                reply,
                HostMessage::Rejected {
                    reason: RejectReason::InvalidRequest { .. }
                }
            ),
            "expected InvalidRequest, got {reply:?}"
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn heartbeat_before_join_is_rejected() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();

        let (tx, mut rx) = transport.dial(host.room_id()).await.unwrap().split();
        tx.send(encode(&PlayerMessage::Heartbeat).unwrap()).unwrap();

        expect_invalid_request(&mut rx).await;
        assert!(host.roster().players.is_empty());
    }

    #[tokio::test]
    async fn malformed_first_frame_is_rejected() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();

        let (tx, mut rx) = transport.dial(host.room_id()).await.unwrap().split();
        tx.send("garbage".to_string()).unwrap();

        expect_invalid_request(&mut rx).await;
    }

    #[tokio::test]
    async fn malformed_frame_after_join_is_ignored() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();
        let (tx, mut rx, _) = raw_join(&transport, host.room_id(), "Alice").await;
        let roster: HostMessage = decode(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(roster, HostMessage::Roster { .. }));

        tx.send("{not json".to_string()).unwrap();
        tx.send(encode(&PlayerMessage::Heartbeat).unwrap()).unwrap();

        let ack: HostMessage = decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(ack, HostMessage::HeartbeatAck);
        assert_eq!(host.roster().connected_count(), 1);
    }

    #[tokio::test]
    async fn silent_peer_is_closed_after_admission_deadline() {
        let transport = MemoryTransport::new();
        let config = SessionConfig::new(2).with_admission_timeout(Duration::from_millis(30));
        let host = HostSession::start_with_room_id(&transport, room("AB12"), config)
            .await
            .unwrap();

        let (_tx, mut rx) = transport.dial(host.room_id()).await.unwrap().split();
        tokio::time::timeout(Duration::from_secs(2), expect_invalid_request(&mut rx))
            .await
            .expect("pending link should be closed");
    }

    #[tokio::test]
    async fn admission_deadline_spares_joined_players() {
        let transport = MemoryTransport::new();
        let config = SessionConfig::new(2).with_admission_timeout(Duration::from_millis(30));
        let host = HostSession::start_with_room_id(&transport, room("AB12"), config)
            .await
            .unwrap();
        let (_tx, _rx, reply) = raw_join(&transport, host.room_id(), "Alice").await;
        assert!(matches!(reply, HostMessage::Joined { .. }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(host.roster().connected_count(), 1);
    }

    #[tokio::test]
    async fn heartbeat_is_acknowledged() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();
        let (tx, mut rx, _) = raw_join(&transport, host.room_id(), "Alice").await;

        // Joined 직후 로스터 브로드캐스트가 먼저 온다
        let roster: HostMessage = decode(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(roster, HostMessage::Roster { .. }));

        tx.send(encode(&PlayerMessage::Heartbeat).unwrap()).unwrap();
        let ack: HostMessage = decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(ack, HostMessage::HeartbeatAck);
    }

    #[tokio::test]
    async fn player_game_state_reaches_host_subscribers() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();
        let mut events = host.subscribe();
        let (tx, _rx, reply) = raw_join(&transport, host.room_id(), "Alice").await;
        let HostMessage::Joined { player_id, .. } = reply else {
            panic!("expected Joined, got {reply:?}");
        };

        let data = serde_json::json!({"guess": "a dragon"});
        tx.send(encode(&PlayerMessage::GameState { data: data.clone() }).unwrap())
            .unwrap();

        loop {
            if let SessionEvent::GameState { from, data: got } = events.recv().await.unwrap() {
                assert_eq!(from, Some(player_id));
                assert_eq!(got, data);
                break;
            }
        }
    }

    #[tokio::test]
    async fn send_to_unknown_player_fails() {
        let transport = MemoryTransport::new();
        let host = HostSession::start(&transport, SessionConfig::new(2)).await.unwrap();
        let stranger = crate::identity::generate_player_id();
        assert_eq!(
            host.send_to(stranger, serde_json::json!({})).await,
            Err(SessionError::Send(SendError::Closed))
        );
    }

    #[tokio::test]
    async fn leave_marks_player_disconnected() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();
        let (tx, _rx, _) = raw_join(&transport, host.room_id(), "Alice").await;
        tx.send(encode(&PlayerMessage::Leave).unwrap()).unwrap();

        let mut roster = host.watch_roster();
        let snapshot = roster
            .wait_for(|r| r.players.len() == 1 && !r.players[0].connected)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.connected_count(), 0);
    }

    #[tokio::test]
    async fn prune_policy_removes_record_after_delay() {
        let transport = MemoryTransport::new();
        let config = SessionConfig::new(2)
            .with_disconnect_policy(DisconnectPolicy::PruneAfter(Duration::from_millis(20)));
        let host = HostSession::start_with_room_id(&transport, room("AB12"), config)
            .await
            .unwrap();
        let (tx, rx, _) = raw_join(&transport, host.room_id(), "Alice").await;
        drop((tx, rx));

        let mut roster = host.watch_roster();
        tokio::time::timeout(Duration::from_secs(2), roster.wait_for(|r| r.version >= 3 && r.players.is_empty()))
            .await
            .expect("record should be pruned")
            .unwrap();
    }

    #[tokio::test]
    async fn rejoin_before_prune_delay_keeps_record() {
        let transport = MemoryTransport::new();
        let config = SessionConfig::new(2)
            .with_disconnect_policy(DisconnectPolicy::PruneAfter(Duration::from_millis(50)));
        let host = HostSession::start_with_room_id(&transport, room("AB12"), config)
            .await
            .unwrap();
        let mut events = host.subscribe();

        let (tx, rx, reply) = raw_join(&transport, host.room_id(), "Alice").await;
        let HostMessage::Joined { player_id, .. } = reply else {
            panic!("expected Joined, got {reply:?}");
        };
        drop((tx, rx));

        let mut roster = host.watch_roster();
        roster
            .wait_for(|r| r.players.len() == 1 && !r.players[0].connected)
            .await
            .unwrap();

        let (tx, mut rx) = transport.dial(host.room_id()).await.unwrap().split();
        let request = PlayerMessage::JoinRequest {
            name: "Alice".to_string(),
            avatar: None,
            rejoin_id: Some(player_id),
        };
        tx.send(encode(&request).unwrap()).unwrap();
        let reply: HostMessage = decode(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(reply, HostMessage::Joined { player_id: id, .. } if id == player_id));

        tokio::time::sleep(Duration::from_millis(150)).await;

        let snapshot = host.roster();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, player_id);
        assert!(snapshot.players[0].connected);
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::PlayerPruned { .. }));
        }
    }

    #[tokio::test]
    async fn end_closes_every_channel_and_releases_room() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();
        let (_tx, mut rx, _) = raw_join(&transport, host.room_id(), "Alice").await;

        host.end().await;
        host.end().await;

        let mut saw_end = false;
        while let Some(frame) = rx.recv().await {
            if decode::<HostMessage>(&frame) == Some(HostMessage::SessionEnded) {
                saw_end = true;
            }
        }
        assert!(saw_end);
        assert!(host.is_ended());
        assert_eq!(host.state(), ConnectionState::Ended);
        assert!(!transport.is_listening(&room("AB12")));
        assert!(host.broadcast_game_state(serde_json::json!(1)).is_err());
    }

    #[tokio::test]
    async fn dropping_last_handle_ends_session() {
        let transport = MemoryTransport::new();
        let host = HostSession::start_with_room_id(&transport, room("AB12"), SessionConfig::new(2))
            .await
            .unwrap();
        let mut state = host.watch_state();
        drop(host);

        state.wait_for(|s| *s == ConnectionState::Ended).await.unwrap();
        assert!(!transport.is_listening(&room("AB12")));
    }
}
