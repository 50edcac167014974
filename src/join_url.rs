//! 조인 URL 생성 / 파싱
//!
//! 방 코드 파라미터 이름은 `room` 으로 통일한다. 예전 링크의 `roomCode` 는
//! 파싱할 때만 받아준다.

use crate::identity::RoomId;
use reqwest::Url;

pub const ROOM_PARAM: &str = "room";
pub const LEGACY_ROOM_PARAM: &str = "roomCode";
pub const GAME_PARAM: &str = "game";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinUrlError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("url has no room parameter")]
    MissingRoom,

    #[error("invalid room code: {0}")]
    InvalidRoom(String),
}

/// 조인 URL 에서 꺼낸 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinLink {
    pub room_id: RoomId,
    pub game: Option<String>,
}

/// `{base}?room=ROOM&game=GAME`. base 의 다른 쿼리 파라미터는 유지한다.
pub fn build_join_url(
    base: &str,
    room_id: &RoomId,
    game: Option<&str>,
) -> Result<Url, JoinUrlError> {
    let mut url = Url::parse(base).map_err(|e| JoinUrlError::InvalidUrl(e.to_string()))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_reserved(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query.extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        query.append_pair(ROOM_PARAM, room_id.as_str());
        if let Some(game) = game {
            query.append_pair(GAME_PARAM, game);
        }
    }
    Ok(url)
}

pub fn parse_join_url(raw: &str) -> Result<JoinLink, JoinUrlError> {
    let url = Url::parse(raw).map_err(|e| JoinUrlError::InvalidUrl(e.to_string()))?;

    let mut room = None;
    let mut legacy_room = None;
    let mut game = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            ROOM_PARAM if room.is_none() => room = Some(value.into_owned()),
            LEGACY_ROOM_PARAM if legacy_room.is_none() => legacy_room = Some(value.into_owned()),
            GAME_PARAM if game.is_none() => game = Some(value.into_owned()),
            _ => {}
        }
    }

    let raw_room = room.or(legacy_room).ok_or(JoinUrlError::MissingRoom)?;
    let room_id = RoomId::parse(&raw_room).ok_or(JoinUrlError::InvalidRoom(raw_room))?;
    Ok(JoinLink { room_id, game })
}

fn is_reserved(key: &str) -> bool {
    key == ROOM_PARAM || key == LEGACY_ROOM_PARAM || key == GAME_PARAM
}
