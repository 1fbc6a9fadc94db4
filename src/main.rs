use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scan_login::login::{LoginConfig, login_routes};
use scan_login::store::{MemoryStore, spawn_sweeper};
use scan_login::wechat::{WechatClient, WechatConfig};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:28083";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scan_login=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let wechat = WechatConfig::from_env()?;
    let config = LoginConfig::from_env(&wechat)?;
    tracing::info!(
        app_id = %wechat.app_id(),
        token = %mask_secret(wechat.token()),
        encrypted = wechat.encoding_aes_key().is_some(),
        base_path = %config.base_path(),
        features = ?config.features(),
        session_ttl_secs = config.session_ttl().as_secs(),
        "Loaded configuration from environment/.env"
    );

    let store = Arc::new(MemoryStore::new(config.session_ttl()));
    spawn_sweeper(store.clone(), SWEEP_INTERVAL);

    let client = WechatClient::new(wechat)?;
    let app = Router::new()
        .merge(login_routes(config, client, store))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.into())
        .parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
