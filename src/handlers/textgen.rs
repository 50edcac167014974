//! 텍스트 생성 프록시 핸들러

use super::ApiError;
use crate::state::AppState;
use crate::textgen::{TextGenRequest, TextGenResponse};
use axum::{extract::State, Json};
use std::sync::Arc;

/// 서버에 설정된 키로 텍스트 생성 요청 전달
pub async fn generate_text(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<TextGenRequest>,
) -> Result<Json<TextGenResponse>, ApiError> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }
    if request.api_key.is_none() {
        request.api_key = state.config.textgen.api_key.clone();
    }

    let response = state.textgen.generate(request).await?;
    Ok(Json(response))
}
