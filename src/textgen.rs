//! 텍스트 생성 클라이언트
//!
//! 세션 상태와 무관하며 `TextGenerator` 구현만 바꿔 끼우면 된다.
//! 재시도는 하지 않는다.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-instruct";
pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGenRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGenResponse {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum TextGenError {
    #[error("API key is missing")]
    Authentication,

    #[error("request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: TextGenRequest) -> Result<TextGenResponse, TextGenError>;
}

/// OpenAI 호환 completions 엔드포인트 클라이언트
pub struct OpenAiCompletions {
    client: Client,
    base_url: String,
}

impl OpenAiCompletions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// completions 응답 중 필요한 부분
#[derive(Deserialize)]
struct CompletionBody {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl TextGenerator for OpenAiCompletions {
    async fn generate(&self, request: TextGenRequest) -> Result<TextGenResponse, TextGenError> {
        let api_key = request
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(TextGenError::Authentication)?;

        let model = request.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let response = self
            .client
            .post(format!("{}/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({
                "model": model,
                "prompt": request.prompt,
                "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), model = %model, "Text generation failed");
            return Err(TextGenError::Request {
                status: status.as_u16(),
                body,
            });
        }

        let body: CompletionBody = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.text.trim().to_string())
            .unwrap_or_default();
        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        tracing::debug!(model = %model, total_tokens = usage.total_tokens, "Text generated");
        Ok(TextGenResponse { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    fn request(api_key: Option<&str>) -> TextGenRequest {
        TextGenRequest {
            prompt: "Describe a painting of a goose".into(),
            max_tokens: Some(16),
            temperature: None,
            model: None,
            api_key: api_key.map(String::from),
        }
    }

    /// 로컬 포트에 가짜 completions 서버를 띄운다
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn missing_api_key_is_an_authentication_error() {
        let client = OpenAiCompletions::new("http://127.0.0.1:9/v1");
        for key in [None, Some(""), Some("   ")] {
            let err = client.generate(request(key)).await.unwrap_err();
            assert!(matches!(err, TextGenError::Authentication));
        }
    }

    #[tokio::test]
    async fn non_success_status_is_a_request_error() {
        let app = Router::new().route(
            "/v1/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let client = OpenAiCompletions::new(serve(app).await);

        let err = client.generate(request(Some("sk-test"))).await.unwrap_err();
        match err {
            TextGenError::Request { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn parses_text_and_usage() {
        let app = Router::new().route(
            "/v1/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], DEFAULT_MODEL);
                assert_eq!(body["max_tokens"], 16);
                Json(json!({
                    "choices": [{"text": "\n A goose in a waistcoat."}],
                    "usage": {"prompt_tokens": 7, "completion_tokens": 6, "total_tokens": 13}
                }))
            }),
        );
        let client = OpenAiCompletions::new(serve(app).await);

        let response = client.generate(request(Some("sk-test"))).await.unwrap();
        assert_eq!(response.text, "A goose in a waistcoat.");
        assert_eq!(
            response.usage,
            TokenUsage {
                prompt_tokens: 7,
                completion_tokens: 6,
                total_tokens: 13,
            }
        );
    }
}
