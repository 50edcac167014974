//! 핸들러 모듈

pub mod connection;
pub mod error;
pub mod room;
pub mod textgen;

pub use connection::*;
pub use error::*;
pub use room::*;
pub use textgen::*;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// 라우터 설정
pub fn router(state: Arc<AppState>) -> Router {
    // CORS 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/sessions", post(create_room))
        .route("/sessions/:room", get(get_room).delete(end_room))
        .route("/sessions/:room/events", get(room_events))
        .route("/textgen", post(generate_text))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
