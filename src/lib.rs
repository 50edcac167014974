//! 파티 게임 세션 코디네이터
//!
//! 호스트 한 명이 로스터의 유일한 writer 이고, 플레이어들은 방 코드로 참가해
//! 호스트가 밀어주는 로스터를 미러링한다.

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod join_url;
pub mod protocol;
pub mod qr;
pub mod roster;
pub mod session;
pub mod state;
pub mod textgen;
pub mod transport;

pub use context::{ContextView, SessionContext};
pub use error::{ConnectionError, JoinError, SendError, SessionError};
pub use identity::{generate_room_id, PlayerId, RoomId};
pub use roster::{PlayerRecord, RosterSnapshot};
pub use session::{
    ConnectionState, DisconnectPolicy, HostSession, PlayerProfile, PlayerSession, SessionConfig,
    SessionEvent,
};
pub use transport::{MemoryTransport, Transport};
