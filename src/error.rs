//! 에러 타입 정의
//!
//! 전송 계층 실패는 여기 타입으로 변환되어 위로 올라간다.
//! 연결 해제는 에러가 아니라 `SessionEvent`로 전달된다.

use crate::identity::RoomId;
use std::time::Duration;

/// dial / listen 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("room {0} not found or unreachable")]
    UnknownRoom(RoomId),

    #[error("room {0} is already hosted")]
    RoomInUse(RoomId),

    #[error("connection closed")]
    Closed,

    #[error("no answer from host within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// 특정 피어로의 전송 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("channel closed")]
    Closed,
}

/// 참가 절차 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room is full")]
    RoomFull,

    #[error("invalid join request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// 이미 종료된 세션에 대한 요청
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session has ended")]
    Ended,

    #[error("no active session")]
    NotActive,

    #[error(transparent)]
    Send(#[from] SendError),
}
