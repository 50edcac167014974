//! 이벤트 브로드캐스트
//!
//! 한 피어로의 전송 실패가 다른 피어 전송을 막지 않는다. 전송 실패만으로는
//! 연결 해제로 보지 않으며, 해제는 해당 연결의 close 이벤트로만 처리된다.

use crate::identity::PlayerId;
use crate::protocol::{encode, HostMessage};
use crate::roster::RosterSnapshot;
use crate::transport::ConnectionSender;

/// 연결된 모든 플레이어에게 로스터 전송
pub fn broadcast_roster<'a>(
    peers: impl IntoIterator<Item = (&'a PlayerId, &'a ConnectionSender)>,
    snapshot: &RosterSnapshot,
) -> usize {
    fan_out(
        peers,
        &HostMessage::Roster {
            roster: snapshot.clone(),
        },
    )
}

/// 게임 페이로드를 해석 없이 전달
pub fn broadcast_game_state<'a>(
    peers: impl IntoIterator<Item = (&'a PlayerId, &'a ConnectionSender)>,
    data: &serde_json::Value,
) -> usize {
    fan_out(peers, &HostMessage::GameState { data: data.clone() })
}

/// 전달에 성공한 피어 수를 돌려준다
pub fn fan_out<'a>(
    peers: impl IntoIterator<Item = (&'a PlayerId, &'a ConnectionSender)>,
    message: &HostMessage,
) -> usize {
    let Some(frame) = encode(message) else {
        return 0;
    };

    let mut delivered = 0;
    for (player_id, sender) in peers {
        match sender.send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(player_id = %player_id, error = %e, "Broadcast delivery failed");
            }
        }
    }
    delivered
}
