//! 服务端配置
//!
//! 进程启动时构造一次，显式传给各组件；不依赖模块级全局状态

use serde::{Deserialize, Serialize};

use protocol::{DEFAULT_CUP_COUNT, DEFAULT_PORT, MAX_CONNECTIONS};

/// 网络监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 超出后礼貌拒绝新连接
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_connections: MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    /// 监听地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 从环境变量读取覆盖项（CUPS_HOST / CUPS_PORT / CUPS_MAX_CONNECTIONS）
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("CUPS_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("CUPS_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(max) = std::env::var("CUPS_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.max_connections = max;
            }
        }
        config
    }
}

/// 游戏规则配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GameConfig {
    /// 杯子数量（有效位置 1..=cup_count）
    pub cup_count: u8,
    /// 开局所需最少人数
    pub min_players: usize,
    /// 胜利所需分数
    pub win_score: u32,
    /// 每多少次猜测轮换一次藏家/猜家；0 表示不轮换
    pub role_swap_period: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            cup_count: DEFAULT_CUP_COUNT,
            min_players: 2,
            win_score: 3,
            role_swap_period: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), format!("127.0.0.1:{}", DEFAULT_PORT));
    }
}
