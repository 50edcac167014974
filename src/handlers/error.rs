//! API 에러 응답

use crate::error::ConnectionError;
use crate::textgen::TextGenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("room {0} is already hosted")]
    RoomInUse(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    TextGen(#[from] TextGenError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// 에러 응답 본문
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl From<ConnectionError> for ApiError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::UnknownRoom(room_id) => ApiError::RoomNotFound(room_id.to_string()),
            ConnectionError::RoomInUse(room_id) => ApiError::RoomInUse(room_id.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::RoomNotFound(_) => (StatusCode::NOT_FOUND, "ROOM_NOT_FOUND"),
            ApiError::RoomInUse(_) => (StatusCode::CONFLICT, "ROOM_IN_USE"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::TextGen(TextGenError::Authentication) => {
                (StatusCode::UNAUTHORIZED, "TEXTGEN_AUTH")
            }
            ApiError::TextGen(e) => {
                tracing::error!("Text generation error: {}", e);
                (StatusCode::BAD_GATEWAY, "TEXTGEN_FAILED")
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };

        let body = ErrorResponse {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
