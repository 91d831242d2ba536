use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cups_server::config::{GameConfig, ServerConfig};
use cups_server::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cups_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig::from_env();
    let game = GameConfig::default();
    info!("猜杯子服务端启动中... {}", config.addr());

    Server::new(config, game).run().await
}
