//! 错误类型定义

use thiserror::Error;

/// 规则校验错误
///
/// 所有规则拒绝都是非致命的：状态保持不变，连接保持打开，
/// 只向违规的客户端回复一条 Error 消息
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    /// 不是该玩家的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 角色与动作不符
    #[error("Wrong role for this action")]
    WrongRole,

    /// 当前阶段不允许该动作
    #[error("Action not allowed while {phase}")]
    PhaseError { phase: &'static str },

    /// 杯子位置越界
    #[error("Invalid position: {position} (expected 1..={max})")]
    InvalidPosition { position: u8, max: u8 },
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// 单帧解码失败，仅丢弃该帧
    #[error("Malformed frame: {detail}")]
    Malformed { detail: String },

    /// 连续解码失败达到上限
    #[error("Too many consecutive malformed frames")]
    MalformedLimit,

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 用户名为空
    #[error("Username is empty")]
    UsernameEmpty,

    /// 用户名过长
    #[error("Username too long: {len} chars (max: {max})")]
    UsernameTooLong { len: usize, max: usize },
}

impl ProtocolError {
    /// 是否属于连接必须关闭的致命错误
    ///
    /// 单帧解码失败不致命；IO 断开、帧超限、连续解码失败致命
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::Malformed { .. })
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
