//! 프로세스 내 전송 계층
//!
//! 테스트용 가짜 구현이자, 웹소켓 브리지가 dial 하는 허브로도 쓰인다.

use super::{Connection, ConnectionId, Listener, Transport};
use crate::error::ConnectionError;
use crate::identity::RoomId;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Hub>,
}

#[derive(Default)]
struct Hub {
    /// 방 코드 -> 리스너로 가는 연결 큐
    rooms: DashMap<RoomId, UnboundedSender<Connection>>,
    next_id: AtomicU64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self, room_id: &RoomId) -> bool {
        self.inner
            .rooms
            .get(room_id)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    fn next_id(&self) -> ConnectionId {
        ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(&self, room_id: &RoomId) -> Result<Listener, ConnectionError> {
        let (tx, rx) = mpsc::unbounded_channel();

        match self.inner.rooms.entry(room_id.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_closed() {
                    return Err(ConnectionError::RoomInUse(room_id.clone()));
                }
                entry.insert(tx.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(tx.clone());
            }
        }

        tracing::debug!(room_id = %room_id, "Listening");

        let hub = self.inner.clone();
        let key = room_id.clone();
        Ok(Listener::new(room_id.clone(), rx, move || {
            // 같은 코드로 다시 listen 한 경우 새 등록은 건드리지 않음
            hub.rooms.remove_if(&key, |_, registered| registered.same_channel(&tx));
            tracing::debug!(room_id = %key, "Stopped listening");
        }))
    }

    async fn dial(&self, room_id: &RoomId) -> Result<Connection, ConnectionError> {
        let listener = self
            .inner
            .rooms
            .get(room_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConnectionError::UnknownRoom(room_id.clone()))?;

        let (to_host_tx, to_host_rx) = mpsc::unbounded_channel();
        let (to_player_tx, to_player_rx) = mpsc::unbounded_channel();

        let host_side = Connection::new(self.next_id(), to_player_tx, to_host_rx);
        let player_side = Connection::new(self.next_id(), to_host_tx, to_player_rx);

        if listener.send(host_side).is_err() {
            self.inner
                .rooms
                .remove_if(room_id, |_, registered| registered.is_closed());
            return Err(ConnectionError::UnknownRoom(room_id.clone()));
        }

        tracing::debug!(room_id = %room_id, conn = %player_side.id(), "Dialed");
        Ok(player_side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str) -> RoomId {
        RoomId::parse(code).unwrap()
    }

    #[tokio::test]
    async fn dial_unknown_room_fails() {
        let transport = MemoryTransport::new();
        let err = transport.dial(&room("ZZZZ")).await.err().unwrap();
        assert_eq!(err, ConnectionError::UnknownRoom(room("ZZZZ")));
    }

    #[tokio::test]
    async fn listen_twice_is_refused_until_listener_dropped() {
        let transport = MemoryTransport::new();
        let listener = transport.listen(&room("AB12")).await.unwrap();
        assert!(matches!(
            transport.listen(&room("AB12")).await,
            Err(ConnectionError::RoomInUse(_))
        ));

        drop(listener);
        assert!(!transport.is_listening(&room("AB12")));
        assert!(transport.dial(&room("AB12")).await.is_err());
        assert!(transport.listen(&room("AB12")).await.is_ok());
    }

    #[tokio::test]
    async fn frames_flow_in_order_both_ways() {
        let transport = MemoryTransport::new();
        let mut listener = transport.listen(&room("AB12")).await.unwrap();
        let player = transport.dial(&room("AB12")).await.unwrap();
        let host = listener.accept().await.unwrap();

        let (player_tx, mut player_rx) = player.split();
        let (host_tx, mut host_rx) = host.split();

        for i in 0..5 {
            player_tx.send(format!("p{i}")).unwrap();
        }
        host_tx.send("welcome".into()).unwrap();

        for i in 0..5 {
            assert_eq!(host_rx.recv().await.unwrap(), format!("p{i}"));
        }
        assert_eq!(player_rx.recv().await.unwrap(), "welcome");
    }

    #[tokio::test]
    async fn dropping_one_side_closes_the_other_once() {
        let transport = MemoryTransport::new();
        let mut listener = transport.listen(&room("AB12")).await.unwrap();
        let player = transport.dial(&room("AB12")).await.unwrap();
        let (host_tx, mut host_rx) = listener.accept().await.unwrap().split();

        drop(player);
        assert_eq!(host_rx.recv().await, None);
        assert_eq!(host_rx.recv().await, None);
        host_tx.closed().await;
        assert!(host_tx.send("late".into()).is_err());
    }
}
