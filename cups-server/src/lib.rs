//! 猜杯子游戏服务端
//!
//! 包含:
//! - 连接接入与每连接接收循环
//! - 会话注册表与广播
//! - 互斥保护的共享游戏状态仓库
//! - 纯函数回合规则引擎

pub mod config;
pub mod connection;
pub mod registry;
pub mod rules;
pub mod server;
pub mod store;

pub use config::{GameConfig, ServerConfig};
pub use connection::ConnectionHandle;
pub use registry::SessionRegistry;
pub use rules::{Action, Event};
pub use server::{Server, ServerContext};
pub use store::GameStore;
