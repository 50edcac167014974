//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::identity::RoomId;
use crate::session::HostSession;
use crate::textgen::{OpenAiCompletions, TextGenerator};
use crate::transport::MemoryTransport;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 호스팅 중인 방 (room_id -> HostedRoom)
    pub rooms: DashMap<RoomId, HostedRoom>,
    /// 플레이어 웹소켓이 dial 하는 허브
    pub transport: MemoryTransport,
    pub textgen: Arc<dyn TextGenerator>,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let textgen = Arc::new(OpenAiCompletions::new(config.textgen.base_url.clone()));
        Self::with_textgen(config, textgen)
    }

    pub fn with_textgen(config: Config, textgen: Arc<dyn TextGenerator>) -> Self {
        Self {
            rooms: DashMap::new(),
            transport: MemoryTransport::new(),
            textgen,
            config: Arc::new(config),
        }
    }

    pub fn session(&self, room_id: &RoomId) -> Option<HostSession> {
        self.rooms.get(room_id).map(|room| room.session.clone())
    }
}

/// 호스팅 중인 방
pub struct HostedRoom {
    pub session: HostSession,
    pub join_url: String,
    pub created_at: Instant,
}
