//! 猜杯子游戏共享协议库
//!
//! 包含:
//! - 消息类型定义 (ClientMessage, ServerMessage)
//! - 游戏状态快照 (GameSnapshot) 与脱敏视图
//! - 传输层抽象 (Connector, Connection, Listener traits)
//! - 换行分隔 JSON 帧编解码 (FrameReader, FrameWriter)
//! - 错误分类 (ProtocolError, RuleViolation)

mod constants;
mod error;
mod message;
mod state;
mod transport;

pub use constants::*;
pub use error::{ProtocolError, Result, RuleViolation};
pub use message::{ClientMessage, ErrorCode, PlayerId, Position, ServerMessage};
pub use state::{ActionKind, GameSnapshot, MoveRecord, Phase, PlayerInfo, Role};
pub use transport::{
    Connection, Connector, FrameReader, FrameWriter, Listener, NetworkConfig,
    TcpConnection, TcpConnector, TcpListener,
};
