//! 방 코드 / 플레이어 ID 생성

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 생성에 쓰는 문자 집합 (0/O, 1/I 처럼 헷갈리는 문자 제외, 32자)
const ROOM_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 32^6 ≈ 1.07 × 10^9
pub const ROOM_ID_LEN: usize = 6;

const MIN_PARSE_LEN: usize = 4;
const MAX_PARSE_LEN: usize = 12;

/// 호스트 세션 하나에 부여되는 방 코드
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// 사용자 입력(URL, 수동 입력)에서 방 코드 파싱. 대문자로 정규화한다.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        let valid_len = (MIN_PARSE_LEN..=MAX_PARSE_LEN).contains(&code.len());
        if valid_len && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Some(Self(code))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RoomId::parse(&value).ok_or_else(|| format!("invalid room id: {value:?}"))
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

/// 플레이어 ID. 참가 시 발급되며 세션 안에서 재사용되지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// 새 방 코드 생성 (I/O 없음, 실패 없음)
pub fn generate_room_id() -> RoomId {
    let mut rng = rand::thread_rng();
    let code = (0..ROOM_ID_LEN)
        .map(|_| ROOM_ALPHABET[rng.gen_range(0..ROOM_ALPHABET.len())] as char)
        .collect();
    RoomId(code)
}

/// 새 플레이어 ID 생성
pub fn generate_player_id() -> PlayerId {
    PlayerId(Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_room_ids_are_url_safe_and_parse_back() {
        for _ in 0..200 {
            let id = generate_room_id();
            assert_eq!(id.as_str().len(), ROOM_ID_LEN);
            assert!(id.as_str().bytes().all(|b| ROOM_ALPHABET.contains(&b)));
            assert_eq!(RoomId::parse(id.as_str()), Some(id));
        }
    }

    #[test]
    fn generated_room_ids_rarely_collide() {
        let ids: HashSet<_> = (0..1000).map(|_| generate_room_id()).collect();
        assert!(ids.len() >= 999);
    }

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        assert_eq!(RoomId::parse("  ab12 ").unwrap().as_str(), "AB12");
    }

    #[test]
    fn parse_accepts_hand_typed_codes_outside_generation_alphabet() {
        assert_eq!(RoomId::parse("ab10").unwrap().as_str(), "AB10");
        assert_eq!(RoomId::parse("OI0123456789").unwrap().as_str(), "OI0123456789");
    }

    #[test]
    fn parse_rejects_bad_codes() {
        assert!(RoomId::parse("").is_none());
        assert!(RoomId::parse("AB1").is_none());
        assert!(RoomId::parse("AB-12").is_none());
        assert!(RoomId::parse("ABCDEFGHJKLMN").is_none());
    }

    #[test]
    fn room_id_deserialization_validates() {
        let ok: RoomId = serde_json::from_str("\"xk4p9q\"").unwrap();
        assert_eq!(ok.as_str(), "XK4P9Q");
        assert!(serde_json::from_str::<RoomId>("\"no way\"").is_err());
    }

    #[test]
    fn player_ids_are_unique() {
        let a = generate_player_id();
        let b = generate_player_id();
        assert_ne!(a, b);
    }
}
