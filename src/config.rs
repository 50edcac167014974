//! 환경 변수 기반 설정 관리

use crate::session::{DisconnectPolicy, SessionConfig};
use std::env;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// 조인 URL 의 기준 주소 (QR 에 들어감)
    pub public_base_url: String,
    pub session: SessionDefaults,
    pub textgen: TextGenConfig,
    pub log_level: String,
}

/// 세션 기본값
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub max_players: usize,
    /// 참가 응답 대기 시간. 호스트 쪽에서는 JoinRequest 를 기다리는 시간
    pub join_timeout: Duration,
    pub disconnect_policy: DisconnectPolicy,
    /// 연결된 플레이어 없이 이 시간이 지난 세션은 정리
    pub idle_timeout: Duration,
}

/// 텍스트 생성 설정
#[derive(Debug, Clone)]
pub struct TextGenConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port = parse_env("PORT", 5502);
        Self {
            port,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}/join")),
            session: SessionDefaults {
                max_players: parse_env("MAX_PLAYERS", 8),
                join_timeout: Duration::from_millis(parse_env("JOIN_TIMEOUT_MS", 10_000)),
                disconnect_policy: match env::var("DISCONNECT_PRUNE_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    Some(ms) => DisconnectPolicy::PruneAfter(Duration::from_millis(ms)),
                    None => DisconnectPolicy::Retain,
                },
                idle_timeout: Duration::from_millis(parse_env("SESSION_IDLE_TIMEOUT_MS", 3_600_000)),
            },
            textgen: TextGenConfig {
                base_url: env::var("TEXTGEN_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl SessionDefaults {
    /// 요청 값이 없으면 기본값으로 채운 세션 설정
    pub fn session_config(&self, max_players: Option<usize>) -> SessionConfig {
        SessionConfig::new(max_players.unwrap_or(self.max_players))
            .with_disconnect_policy(self.disconnect_policy)
            .with_admission_timeout(self.join_timeout)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_carries_defaults() {
        let defaults = SessionDefaults {
            max_players: 6,
            join_timeout: Duration::from_millis(1500),
            disconnect_policy: DisconnectPolicy::PruneAfter(Duration::from_secs(30)),
            idle_timeout: Duration::from_secs(60),
        };

        let config = defaults.session_config(None);
        assert_eq!(config.max_players, 6);
        assert_eq!(config.admission_timeout, Duration::from_millis(1500));
        assert_eq!(
            config.disconnect_policy,
            DisconnectPolicy::PruneAfter(Duration::from_secs(30))
        );
        assert_eq!(defaults.session_config(Some(3)).max_players, 3);
    }
}
