//! 파티 세션 호스트 서버

use party_session::config::Config;
use party_session::handlers;
use party_session::state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::new(config.clone()));

    // 방 정리 스케줄러
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            handlers::cleanup_idle_rooms(cleanup_state.clone()).await;
        }
    });

    let app = handlers::router(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Party session host started");
    tracing::info!("Address: {}", addr);
    tracing::info!("Player WebSocket: ws://{}/ws?room=CODE", addr);
    tracing::info!("Join links: {}", config.public_base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 남은 세션 정리
    let rooms: Vec<_> = state
        .rooms
        .iter()
        .map(|entry| entry.value().session.clone())
        .collect();
    for session in rooms {
        session.end().await;
    }
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
