//! 피어 연결 추상화
//!
//! 호스트는 `listen`, 플레이어는 `dial`. 연결은 순서가 보장되는 양방향
//! 텍스트 채널이며, 수신 측 `recv()` 가 `None` 을 돌려주는 것이 close 이벤트다.

pub mod memory;
pub mod websocket;

use crate::error::{ConnectionError, SendError};
use crate::identity::RoomId;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub use memory::MemoryTransport;

/// 프레임 단위 (JSON 텍스트)
pub type Frame = String;

/// 프로세스 안에서 연결을 구분하는 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 방 코드로 들어오는 연결 대기 (호스트)
    async fn listen(&self, room_id: &RoomId) -> Result<Listener, ConnectionError>;

    /// 방 코드로 연결 시도 (플레이어)
    async fn dial(&self, room_id: &RoomId) -> Result<Connection, ConnectionError>;
}

/// 들어오는 연결 스트림. drop 되면 방 코드 등록이 해제된다.
pub struct Listener {
    room_id: RoomId,
    incoming: UnboundedReceiver<Connection>,
    on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Listener {
    pub fn new(
        room_id: RoomId,
        incoming: UnboundedReceiver<Connection>,
        on_drop: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            room_id,
            incoming,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// 다음 연결. 전송 계층이 사라지면 None
    pub async fn accept(&mut self) -> Option<Connection> {
        self.incoming.recv().await
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.incoming.close();
        if let Some(unregister) = self.on_drop.take() {
            unregister();
        }
    }
}

/// 양방향 채널
pub struct Connection {
    sender: ConnectionSender,
    receiver: ConnectionReceiver,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: UnboundedSender<Frame>, rx: UnboundedReceiver<Frame>) -> Self {
        Self {
            sender: ConnectionSender { id, tx },
            receiver: ConnectionReceiver { id, rx },
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.sender.id
    }

    pub fn split(self) -> (ConnectionSender, ConnectionReceiver) {
        (self.sender, self.receiver)
    }
}

/// 송신 측. 복제 가능하며 모든 복제본이 drop 되면 상대에게 close 가 전달된다.
#[derive(Clone)]
pub struct ConnectionSender {
    id: ConnectionId,
    tx: UnboundedSender<Frame>,
}

impl ConnectionSender {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 순서 보장, best-effort 전송
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.tx.send(frame).map_err(|_| SendError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 상대가 수신을 멈추면 완료
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// 수신 측
pub struct ConnectionReceiver {
    id: ConnectionId,
    rx: UnboundedReceiver<Frame>,
}

impl ConnectionReceiver {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 상대가 보낸 순서대로. None 이면 채널이 닫힌 것
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}
